//! Loading the ticker universe from a plain-text file.
//!
//! The file is a newline-delimited list of symbols; comments and blank
//! lines are skipped, and each symbol is uppercased.

use std::path::Path;

use super::ConfigError;

/// Reads the ticker universe from `path`.
///
/// Lines that are empty (after trimming) or begin with `#` are skipped.
/// A trailing comma on a line is stripped before uppercasing, so that both
/// `AAPL` and `AAPL,` style files work. Returns an error if the file cannot
/// be read, or if it contains no tickers after filtering.
pub fn load_tickers_from_file(path: impl AsRef<Path>) -> Result<Vec<String>, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::TickerUniverse(format!("failed to read {}: {e}", path.display()))
    })?;

    let tickers: Vec<String> = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.trim_end_matches(',').trim().to_uppercase())
        .filter(|line| !line.is_empty())
        .collect();

    if tickers.is_empty() {
        return Err(ConfigError::TickerUniverse(format!(
            "{} contained no tickers",
            path.display()
        )));
    }

    Ok(tickers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn skips_blank_lines_and_comments() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# NASDAQ-100").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "aapl,").unwrap();
        writeln!(file, "msft").unwrap();
        let tickers = load_tickers_from_file(file.path()).unwrap();
        assert_eq!(tickers, vec!["AAPL".to_string(), "MSFT".to_string()]);
    }

    #[test]
    fn errors_on_missing_file() {
        let result = load_tickers_from_file("/nonexistent/path/tickers.txt");
        assert!(result.is_err());
    }

    #[test]
    fn errors_on_empty_universe() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# nothing but comments").unwrap();
        let result = load_tickers_from_file(file.path());
        assert!(result.is_err());
    }
}
