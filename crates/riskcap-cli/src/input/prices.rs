use chrono::NaiveDate;
use riskcap_core::estimation::returns::{AssetPrices, PricePoint};
use std::io::Read;

use super::file::resolve_path;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Read a wide adjusted-close table: a `date` column followed by one column
/// per ticker. Empty, `NaN`, `null` and `NA` cells become missing prices.
pub fn read_prices_csv(path: &str) -> Result<Vec<AssetPrices>, Box<dyn std::error::Error>> {
    let resolved = resolve_path(path)?;
    let file = std::fs::File::open(&resolved)
        .map_err(|e| format!("Failed to read '{}': {}", resolved.display(), e))?;
    parse_prices(file).map_err(|e| format!("Failed to parse '{}': {}", resolved.display(), e).into())
}

/// Parse the wide price table from any reader.
pub fn parse_prices<R: Read>(reader: R) -> Result<Vec<AssetPrices>, Box<dyn std::error::Error>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let headers = rdr.headers()?.clone();
    if headers.len() < 2 {
        return Err("expected a date column followed by at least one ticker column".into());
    }
    let mut assets: Vec<AssetPrices> = headers
        .iter()
        .skip(1)
        .map(|ticker| AssetPrices {
            ticker: ticker.to_string(),
            prices: Vec::new(),
        })
        .collect();

    for (row, record) in rdr.records().enumerate() {
        let record = record?;
        let raw_date = record.get(0).unwrap_or_default();
        let date = NaiveDate::parse_from_str(raw_date, DATE_FORMAT)
            .map_err(|e| format!("row {}: bad date '{}': {}", row + 2, raw_date, e))?;

        for (i, asset) in assets.iter_mut().enumerate() {
            let cell = record.get(i + 1).unwrap_or_default();
            let adj_close = parse_cell(cell).map_err(|e| {
                format!("row {}, column '{}': {}", row + 2, asset.ticker, e)
            })?;
            asset.prices.push(PricePoint { date, adj_close });
        }
    }

    Ok(assets)
}

fn parse_cell(cell: &str) -> Result<Option<f64>, std::num::ParseFloatError> {
    match cell {
        "" => Ok(None),
        c if c.eq_ignore_ascii_case("nan")
            || c.eq_ignore_ascii_case("null")
            || c.eq_ignore_ascii_case("na") =>
        {
            Ok(None)
        }
        c => c.parse::<f64>().map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_wide_table() {
        let data = "date,AAPL,MSFT\n2024-01-02,185.6,370.9\n2024-01-03,184.2,\n2024-01-04,NaN,367.8\n";
        let assets = parse_prices(data.as_bytes()).unwrap();
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].ticker, "AAPL");
        assert_eq!(assets[1].prices.len(), 3);
        assert_eq!(assets[0].prices[0].adj_close, Some(185.6));
        assert_eq!(assets[1].prices[1].adj_close, None);
        assert_eq!(assets[0].prices[2].adj_close, None);
        assert_eq!(
            assets[0].prices[2].date,
            NaiveDate::from_ymd_opt(2024, 1, 4).unwrap()
        );
    }

    #[test]
    fn test_rejects_bad_date() {
        let data = "date,AAPL\n01/02/2024,185.6\n";
        let err = parse_prices(data.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("bad date"));
    }

    #[test]
    fn test_rejects_table_without_tickers() {
        assert!(parse_prices("date\n2024-01-02\n".as_bytes()).is_err());
    }
}
