use flate2::read::MultiGzDecoder;
use serde::Deserialize;
use std::fmt;
use std::io::Read;

use super::EtlError;

/// Hundredths, i.e. a `decimal(10,2)` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Decimal2(i64);

impl Decimal2 {
    pub const PRECISION: i32 = 10;
    pub const SCALE: i32 = 2;
    const LIMIT: i64 = 10_000_000_000;

    /// Rounds the shortest decimal form of `value` half away from zero, so
    /// `1.005` becomes `1.01`. `None` when it does not fit `decimal(10,2)`.
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        // f64 Display is the shortest round-trip form and never uses an exponent
        let text = value.abs().to_string();
        let (whole, fraction) = text.split_once('.').unwrap_or((&text, ""));
        if whole.len() > 12 {
            return None;
        }
        let mut digits = fraction.bytes().map(|b| i64::from(b - b'0'));
        let whole: i64 = whole.parse().ok()?;
        let tenths = digits.next().unwrap_or(0);
        let hundredths = digits.next().unwrap_or(0);
        let round_up = digits.next().is_some_and(|d| d >= 5);

        let cents = whole * 100 + tenths * 10 + hundredths + i64::from(round_up);
        if cents >= Self::LIMIT {
            return None;
        }
        Some(Decimal2(if value < 0.0 { -cents } else { cents }))
    }

    pub fn from_cents(cents: i64) -> Self {
        Decimal2(cents)
    }

    pub fn cents(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Decimal2 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    id: String,
    name: String,
    category: String,
    price: String,
    stock: String,
    last_updated: String,
}

/// One typed input row.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRow {
    pub id: String,
    pub name: String,
    pub category: String,
    pub price: f64,
    pub stock: i32,
    pub last_updated: String,
}

/// A row that survived the stock filter, with its derived price.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedRow {
    pub row: BatchRow,
    pub discounted_price: Decimal2,
}

pub fn is_tabular(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.ends_with(".csv") || key.ends_with(".csv.gz")
}

/// Parses one CSV object using its header row as the schema.
pub fn parse_rows(file: &str, data: &[u8]) -> Result<Vec<BatchRow>, EtlError> {
    let data = if file.to_ascii_lowercase().ends_with(".gz") {
        ungzip(file, data)?
    } else {
        data.to_vec()
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(&data[..]);
    let headers = reader
        .headers()
        .map_err(|source| EtlError::Csv {
            file: file.to_string(),
            source,
        })?
        .clone();
    tracing::debug!("{} header: {:?}", file, headers);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|source| EtlError::Csv {
            file: file.to_string(),
            source,
        })?;
        let line = record.position().map_or(0, |p| p.line());
        let raw: CsvRow = record
            .deserialize(Some(&headers))
            .map_err(|source| EtlError::Csv {
                file: file.to_string(),
                source,
            })?;

        let price = raw
            .price
            .parse::<f64>()
            .ok()
            .filter(|p| p.is_finite())
            .ok_or_else(|| parse_error(file, line, "price", &raw.price, "not a number"))?;
        let stock = parse_stock(&raw.stock)
            .map_err(|reason| parse_error(file, line, "stock", &raw.stock, &reason))?;

        rows.push(BatchRow {
            id: raw.id,
            name: raw.name,
            category: raw.category,
            price,
            stock,
            last_updated: raw.last_updated,
        });
    }

    Ok(rows)
}

/// Drops rows without stock and derives `discounted_price`.
pub fn enrich(rows: Vec<BatchRow>, discount_rate: f64) -> Result<Vec<EnrichedRow>, EtlError> {
    rows.into_iter()
        .filter(|row| row.stock > 0)
        .map(|row| {
            let discounted = row.price * (1.0 - discount_rate);
            let discounted_price =
                Decimal2::from_f64(discounted).ok_or_else(|| EtlError::OutOfRange {
                    id: row.id.clone(),
                    value: discounted,
                })?;
            Ok(EnrichedRow {
                row,
                discounted_price,
            })
        })
        .collect()
}

/// Integers, or decimals with no fractional part such as `5.0`.
fn parse_stock(value: &str) -> Result<i32, String> {
    match value.parse::<i32>() {
        Ok(stock) => Ok(stock),
        Err(int_error) => match value.parse::<f64>() {
            Ok(v) if v.fract() == 0.0 && v >= f64::from(i32::MIN) && v <= f64::from(i32::MAX) => {
                Ok(v as i32)
            }
            Ok(_) => Err("not a whole number".to_string()),
            Err(_) => Err(int_error.to_string()),
        },
    }
}

fn parse_error(file: &str, line: u64, field: &str, value: &str, reason: &str) -> EtlError {
    EtlError::Parse {
        file: file.to_string(),
        line,
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn ungzip(file: &str, compressed_data: &[u8]) -> Result<Vec<u8>, EtlError> {
    if compressed_data.is_empty() {
        tracing::warn!("{} is empty, nothing to decompress", file);
        return Ok(Vec::new());
    }
    let mut decoder = MultiGzDecoder::new(compressed_data);
    let mut data = Vec::new();
    decoder
        .read_to_end(&mut data)
        .map_err(|source| EtlError::Decompress {
            file: file.to_string(),
            source,
        })?;
    Ok(data)
}

#[cfg(test)]
mod test {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    const CSV: &str = "id,name,category,price,stock,last_updated
prod101,Laptop Pro,Electronics,1200.5,50,2024-01-01T00:00:00
prod105,Mechanical Keyboard,Accessories,75.2,0,2024-01-01T00:00:00
";

    #[test]
    fn test_decimal2() {
        assert_eq!(Decimal2::from_f64(100.0 * 0.9).unwrap().cents(), 9000);
        assert_eq!(Decimal2::from_f64(90.0).unwrap().to_string(), "90.00");
        assert_eq!(Decimal2::from_f64(25.99 * 0.9).unwrap().to_string(), "23.39");
        assert_eq!(Decimal2::from_f64(0.125).unwrap().to_string(), "0.13");
        assert_eq!(Decimal2::from_cents(-5).to_string(), "-0.05");
        assert!(Decimal2::from_f64(1e9).is_none());
        assert!(Decimal2::from_f64(f64::NAN).is_none());
        assert!(Decimal2::from_f64(f64::MAX).is_none());
        assert_eq!(Decimal2::from_f64(99_999_999.99).unwrap().cents(), 9_999_999_999);
        assert!(Decimal2::from_f64(99_999_999.995).is_none());
    }

    #[test]
    fn test_decimal2_rounds_shortest_decimal_form() {
        assert_eq!(Decimal2::from_f64(1.005).unwrap().to_string(), "1.01");
        assert_eq!(Decimal2::from_f64(2.675).unwrap().to_string(), "2.68");
        assert_eq!(Decimal2::from_f64(1.004).unwrap().to_string(), "1.00");
        assert_eq!(Decimal2::from_f64(-1.005).unwrap().to_string(), "-1.01");
        assert_eq!(Decimal2::from_f64(150.75 * 0.9).unwrap().to_string(), "135.68");
        assert_eq!(Decimal2::from_f64(1e-7).unwrap().cents(), 0);
    }

    #[test]
    fn test_parse_rows() {
        let rows = parse_rows("product_data/a.csv", CSV.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, "prod101");
        assert_eq!(rows[0].price, 1200.5);
        assert_eq!(rows[0].stock, 50);
        assert_eq!(rows[1].stock, 0);
    }

    #[test]
    fn test_parse_rows_header_order_and_extra_columns() {
        let csv = "stock,price,id,name,category,last_updated,warehouse
5, 100.00 ,p1,Desk,Furniture,2024-01-01,north
";
        let rows = parse_rows("x.csv", csv.as_bytes()).unwrap();
        assert_eq!(rows[0].stock, 5);
        assert_eq!(rows[0].price, 100.0);
        assert_eq!(rows[0].name, "Desk");
    }

    #[test]
    fn test_invalid_stock_is_a_parse_error() {
        let csv = "id,name,category,price,stock,last_updated
p1,Desk,Furniture,100.0,5,2024-01-01
p2,Lamp,Furniture,20.0,many,2024-01-01
";
        let err = parse_rows("bad.csv", csv.as_bytes()).unwrap_err();
        match err {
            EtlError::Parse { file, line, field, value, .. } => {
                assert_eq!(file, "bad.csv");
                assert_eq!(line, 3);
                assert_eq!(field, "stock");
                assert_eq!(value, "many");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_stock_accepts_integral_decimals() {
        let csv = "id,name,category,price,stock,last_updated
p1,Desk,Furniture,100.0,5.0,2024-01-01
p2,Lamp,Furniture,20.0,0.00,2024-01-01
";
        let rows = parse_rows("decimals.csv", csv.as_bytes()).unwrap();
        assert_eq!(rows[0].stock, 5);
        assert_eq!(rows[1].stock, 0);

        for stock in ["5.5", "1e12", "NaN"] {
            let csv = format!(
                "id,name,category,price,stock,last_updated\np1,Desk,Furniture,1.0,{},2024-01-01\n",
                stock
            );
            assert!(matches!(
                parse_rows("bad.csv", csv.as_bytes()),
                Err(EtlError::Parse { .. })
            ));
        }
    }

    #[test]
    fn test_missing_column_is_rejected() {
        let csv = "id,name,price\np1,Desk,10\n";
        assert!(matches!(
            parse_rows("short.csv", csv.as_bytes()),
            Err(EtlError::Csv { .. })
        ));
    }

    #[test]
    fn test_gzipped_input() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(CSV.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        let rows = parse_rows("product_data/a.csv.gz", &compressed).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_empty_file() {
        assert!(parse_rows("empty.csv", b"").unwrap().is_empty());
    }

    #[test]
    fn test_enrich_filters_and_discounts() {
        let rows = vec![
            BatchRow {
                id: "a".to_string(),
                name: "A".to_string(),
                category: "c".to_string(),
                price: 50.0,
                stock: 0,
                last_updated: String::new(),
            },
            BatchRow {
                id: "b".to_string(),
                name: "B".to_string(),
                category: "c".to_string(),
                price: 100.0,
                stock: 5,
                last_updated: String::new(),
            },
            BatchRow {
                id: "c".to_string(),
                name: "C".to_string(),
                category: "c".to_string(),
                price: 10.0,
                stock: -3,
                last_updated: String::new(),
            },
        ];
        let enriched = enrich(rows, 0.1).unwrap();
        assert_eq!(enriched.len(), 1);
        assert_eq!(enriched[0].row.id, "b");
        assert_eq!(enriched[0].discounted_price.to_string(), "90.00");
    }

    #[test]
    fn test_is_tabular() {
        assert!(is_tabular("product_data/raw_products_1.csv"));
        assert!(is_tabular("product_data/archive/x.CSV.gz"));
        assert!(!is_tabular("product_data/_SUCCESS"));
        assert!(!is_tabular("product_data/readme.txt"));
    }
}
