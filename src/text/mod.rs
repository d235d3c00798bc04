// Text preparation: cleaning and tokenizing raw review text.

pub mod normalizer;
