use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::model::Model;

/// How [`ModelStore::load`] reads the weight lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadMode {
    /// Read every declared weight
    #[default]
    Strict,
    /// Reproduce the historical reader, which fills only the first
    /// `n - 2` weights from lines `3..=n` and leaves the last two at zero
    Legacy,
}

/// Line-oriented text serialization of a [`Model`]
///
/// ```text
/// <n_tag>
/// <number of weights>
/// <weight, %.4f>   one line per weight
/// ```
///
/// Weights are rounded to 4 decimal places, so a round trip only preserves
/// them to within `1e-4`.
pub struct ModelStore;

impl ModelStore {
    /// Save model to file
    pub fn save<P: AsRef<Path>>(model: &Model, path: P) -> Result<()> {
        let path = path.as_ref();
        log::info!(
            "saving model ({} tags, {} weights) to {}",
            model.num_tags(),
            model.num_params(),
            path.display()
        );
        let mut writer = BufWriter::new(File::create(path)?);
        Self::write(model, &mut writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn write<W: Write>(model: &Model, writer: &mut W) -> Result<()> {
        writeln!(writer, "{}", model.num_tags())?;
        writeln!(writer, "{}", model.num_params())?;
        for w in model.weights() {
            writeln!(writer, "{:.4}", w)?;
        }
        Ok(())
    }

    /// Load model from file
    pub fn load<P: AsRef<Path>>(path: P, mode: LoadMode) -> Result<Model> {
        let path = path.as_ref();
        let model = Self::read(BufReader::new(File::open(path)?), mode)?;
        log::info!(
            "loaded model ({} tags, {} features) from {}",
            model.num_tags(),
            model.num_features(),
            path.display()
        );
        Ok(model)
    }

    pub fn read<R: BufRead>(reader: R, mode: LoadMode) -> Result<Model> {
        let mut lines = reader.lines();
        let mut consumed = 0;
        let mut next_line = |what: &str| -> Result<(usize, String)> {
            consumed += 1;
            match lines.next() {
                Some(line) => Ok((consumed, line?)),
                None => Err(Error::format(consumed, format!("missing {}", what))),
            }
        };

        let (lineno, line) = next_line("tag count")?;
        let n_tag: i64 = parse(lineno, &line)?;
        if n_tag <= 0 {
            return Err(Error::format(lineno, "tag count must be positive"));
        }
        let n_tag = n_tag as usize;

        let (lineno, line) = next_line("weight count")?;
        let size: i64 = parse(lineno, &line)?;
        if size < 0 {
            return Err(Error::format(lineno, "weight count must be non-negative"));
        }
        let size = size as usize;
        if size % n_tag != 0 || size / n_tag < n_tag {
            return Err(Error::format(
                lineno,
                format!("{} weights do not form a model with {} tags", size, n_tag),
            ));
        }

        let filled = match mode {
            LoadMode::Strict => size,
            LoadMode::Legacy => size.saturating_sub(2),
        };
        // The declared count is untrusted until the weight lines are read
        let mut weights = Vec::with_capacity(size.min(MAX_PREALLOC));
        for k in 0..filled {
            let (lineno, line) = next_line(&format!("weight {}", k))?;
            weights.push(parse(lineno, &line)?);
        }

        match mode {
            LoadMode::Strict => {
                // Trailing blank lines are allowed, anything else is not
                for (k, line) in lines.enumerate() {
                    if !line?.trim().is_empty() {
                        return Err(Error::format(
                            consumed + k + 1,
                            format!("unexpected data after {} declared weights", size),
                        ));
                    }
                }
            }
            LoadMode::Legacy => {
                if filled < size {
                    log::warn!(
                        "legacy load leaves the last {} weights at zero",
                        size - filled
                    );
                }
                weights.resize(size, 0.0);
            }
        }
        Model::from_weights(n_tag, weights)
    }
}

/// Upper bound on weights reserved ahead of parsing
const MAX_PREALLOC: usize = 1 << 20;

fn parse<T: std::str::FromStr>(lineno: usize, line: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    line.trim()
        .parse()
        .map_err(|e: T::Err| Error::format(lineno, format!("{:?}: {}", line.trim(), e)))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::model::Init;

    fn read_str(text: &str, mode: LoadMode) -> Result<Model> {
        ModelStore::read(Cursor::new(text.as_bytes()), mode)
    }

    #[test]
    fn test_write_layout() {
        let model = Model::from_weights(1, vec![0.5, -1.23456]).unwrap();
        let mut buf = Vec::new();
        ModelStore::write(&model, &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "1\n2\n0.5000\n-1.2346\n");
    }

    #[test]
    fn test_round_trip_in_memory() {
        let model = Model::new(3, 2, Init::Random { seed: Some(11) }).unwrap();
        let mut buf = Vec::new();
        ModelStore::write(&model, &mut buf).unwrap();
        let loaded = ModelStore::read(Cursor::new(buf), LoadMode::Strict).unwrap();
        assert_eq!(loaded.num_tags(), 2);
        assert_eq!(loaded.num_features(), 3);
        for (a, b) in model.weights().iter().zip(loaded.weights()) {
            assert!((a - b).abs() <= 1e-4 + 1e-12);
        }
    }

    #[test]
    fn test_legacy_leaves_tail_zero() {
        let text = "1\n3\n1.0\n2.0\n3.0\n";
        let strict = read_str(text, LoadMode::Strict).unwrap();
        assert_eq!(strict.weights(), &[1.0, 2.0, 3.0]);
        assert_eq!(strict.num_features(), 2);

        let legacy = read_str(text, LoadMode::Legacy).unwrap();
        assert_eq!(legacy.weights(), &[1.0, 0.0, 0.0]);
        // The legacy reader tolerates the missing tail
        let legacy = read_str("1\n3\n1.0\n", LoadMode::Legacy).unwrap();
        assert_eq!(legacy.weights(), &[1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_format_errors() {
        for text in ["", "2\n", "0\n4\n", "-2\n4\n", "x\n4\n", "2\n5\n", "3\n6\n", "2\n-4\n"] {
            let err = read_str(text, LoadMode::Strict).unwrap_err();
            assert!(matches!(err, Error::Format { .. }), "{:?}", text);
        }
    }

    #[test]
    fn test_truncated_weights() {
        let err = read_str("1\n2\n0.5\n", LoadMode::Strict).unwrap_err();
        assert!(err.to_string().contains("missing weight 1"));

        let err = read_str("1\n2\n0.5\nabc\n", LoadMode::Strict).unwrap_err();
        match err {
            Error::Format { line, .. } => assert_eq!(line, 4),
            e => panic!("unexpected error {:?}", e),
        }
    }

    fn error_line(text: &str) -> usize {
        match read_str(text, LoadMode::Strict).unwrap_err() {
            Error::Format { line, .. } => line,
            e => panic!("unexpected error {:?}", e),
        }
    }

    #[test]
    fn test_missing_line_numbers() {
        assert_eq!(error_line(""), 1);
        assert_eq!(error_line("2\n"), 2);
        assert_eq!(error_line("1\n2\n0.5\n"), 4);
        assert_eq!(error_line("1\n2\n"), 3);
    }

    #[test]
    fn test_trailing_lines() {
        let model = read_str("1\n2\n0.5\n0.7\n\n  \n", LoadMode::Strict).unwrap();
        assert_eq!(model.weights(), &[0.5, 0.7]);
        assert_eq!(error_line("1\n2\n0.5\n0.7\n0.9\n"), 5);
        assert_eq!(error_line("1\n2\n0.5\n0.7\n\nx\n"), 6);
    }

    #[test]
    fn test_oversized_weight_count() {
        // A huge declared count fails on the missing lines instead of allocating
        let err = read_str("1\n1125899906842624\n0.5\n", LoadMode::Strict).unwrap_err();
        assert!(err.to_string().contains("missing weight 1"));
        assert_eq!(error_line("1\n1125899906842624\n0.5\n"), 4);
        let err = read_str("1\n1125899906842624\n0.5\n", LoadMode::Legacy).unwrap_err();
        assert!(matches!(err, Error::Format { line: 4, .. }));
    }
}
