//! Symbol list parsing for the sync universe.

use std::collections::HashSet;

/// Universe synced when `[sync] symbols` is not set.
pub const DEFAULT_SYMBOLS: [&str; 4] = ["BTCUSDT", "ETHBTC", "XLMBTC", "XRPBTC"];

pub fn default_symbols() -> Vec<String> {
    DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymbolListError {
    #[error("empty token in symbol list")]
    EmptyToken,

    #[error("duplicate symbol: {0}")]
    DuplicateSymbol(String),
}

/// Parse `BTCUSDT, ethbtc,XLMBTC` into upper-cased symbols, rejecting blanks and
/// repeats.
pub fn parse_symbols(input: &str) -> Result<Vec<String>, SymbolListError> {
    let mut symbols = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(SymbolListError::EmptyToken);
        }
        let symbol = trimmed.to_uppercase();
        if !seen.insert(symbol.clone()) {
            return Err(SymbolListError::DuplicateSymbol(symbol));
        }
        symbols.push(symbol);
    }

    Ok(symbols)
}
