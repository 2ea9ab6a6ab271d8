//! Domain helpers

pub mod variant_parser;
