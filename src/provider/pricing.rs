//! Per-model price tables, in currency units per million tokens.

/// Input/output price per million tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPrice {
    pub input: f64,
    pub output: f64,
}

impl ModelPrice {
    pub const fn new(input: f64, output: f64) -> Self {
        Self { input, output }
    }

    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 / 1_000_000.0) * self.input
            + (output_tokens as f64 / 1_000_000.0) * self.output
    }
}

/// A model-keyed price list with a fallback for unknown models.
#[derive(Debug, Clone, Copy)]
pub struct PriceTable {
    pub entries: &'static [(&'static str, ModelPrice)],
    pub fallback: ModelPrice,
}

impl PriceTable {
    pub fn lookup(&self, model: &str) -> ModelPrice {
        self.entries
            .iter()
            .find(|(name, _)| *name == model)
            .map_or(self.fallback, |(_, price)| *price)
    }

    pub fn cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        self.lookup(model).cost(input_tokens, output_tokens)
    }
}

pub const OPENAI_PRICES: PriceTable = PriceTable {
    entries: &[
        ("gpt-5.2", ModelPrice::new(5.00, 15.00)),
        ("gpt-4o", ModelPrice::new(2.50, 10.00)),
        ("gpt-4o-mini", ModelPrice::new(0.15, 0.60)),
        ("gpt-4-turbo", ModelPrice::new(10.00, 30.00)),
        ("gpt-4", ModelPrice::new(30.00, 60.00)),
    ],
    fallback: ModelPrice::new(5.00, 15.00),
};

pub const ANTHROPIC_PRICES: PriceTable = PriceTable {
    entries: &[
        ("claude-opus-4-6", ModelPrice::new(15.00, 75.00)),
        ("claude-sonnet-4-5-20250929", ModelPrice::new(3.00, 15.00)),
        ("claude-haiku-4-5-20251001", ModelPrice::new(0.80, 4.00)),
    ],
    fallback: ModelPrice::new(15.00, 75.00),
};
