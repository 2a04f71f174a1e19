//! Registry of book processors, by barcode and by collection.

use crate::clean::processor::BookProcessor;
use crate::clean::{CleanError, CleanResult, principia};

/// Book processors in registration order.
#[derive(Debug, Default)]
pub struct BookCatalog {
    books: Vec<BookProcessor>,
}

impl BookCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The books grokken ships with.
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        catalog.register(principia::principles_psychology());
        catalog.register(principia::federalist());
        catalog
    }

    /// Add a processor, replacing any earlier one with the same barcode.
    pub fn register(&mut self, book: BookProcessor) {
        if let Some(existing) = self.books.iter_mut().find(|b| b.barcode == book.barcode) {
            tracing::debug!(barcode = book.barcode, "replacing registered book processor");
            *existing = book;
        } else {
            self.books.push(book);
        }
    }

    pub fn get(&self, barcode: &str) -> Option<&BookProcessor> {
        self.books.iter().find(|b| b.barcode == barcode)
    }

    /// Like [`get`](Self::get), failing for unregistered barcodes.
    pub fn require(&self, barcode: &str) -> CleanResult<&BookProcessor> {
        self.get(barcode).ok_or_else(|| CleanError::UnknownBook {
            barcode: barcode.to_string(),
        })
    }

    /// Every book in `name`; unknown or empty collections are an error.
    pub fn collection(&self, name: &str) -> CleanResult<Vec<&BookProcessor>> {
        let books: Vec<_> = self.books.iter().filter(|b| b.collection == name).collect();
        if books.is_empty() {
            return Err(CleanError::UnknownCollection {
                name: name.to_string(),
            });
        }
        Ok(books)
    }

    /// Barcodes in `name`, or `None` when no book belongs to it.
    pub fn collection_barcodes(&self, name: &str) -> Option<Vec<&'static str>> {
        self.collection(name)
            .ok()
            .map(|books| books.into_iter().map(|b| b.barcode).collect())
    }

    /// Collection names in first-registration order.
    pub fn collections(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = Vec::new();
        for book in &self.books {
            if !names.contains(&book.collection) {
                names.push(book.collection);
            }
        }
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = &BookProcessor> {
        self.books.iter()
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }
}
