use anyhow::Result;
use rowflow::{Dialect, Multiplexer, QuoteStyle, ReaderConfig, Terminator, WriterConfig};

#[test]
fn defaults_fill_missing_fields() -> Result<()> {
    let config: ReaderConfig = serde_json::from_str(r#"{"has_headers": false}"#)?;
    assert_eq!(
        config,
        ReaderConfig {
            has_headers: false,
            ..Default::default()
        }
    );
    assert_eq!(config.dialect, Dialect::default());

    let writer: WriterConfig = serde_json::from_str("{}")?;
    assert_eq!(writer, WriterConfig::default());
    assert!(writer.write_header);
    Ok(())
}

#[test]
fn dialect_from_json() -> Result<()> {
    let dialect: Dialect = serde_json::from_str(
        r#"{"delimiter": 59, "quoting": "non_numeric", "terminator": "cr_lf"}"#,
    )?;
    assert_eq!(dialect.delimiter, b';');
    assert_eq!(dialect.quote, b'"');
    assert_eq!(dialect.quoting, QuoteStyle::NonNumeric);
    assert_eq!(dialect.terminator, Terminator::CrLf);
    Ok(())
}

#[test]
fn multiplexer_separator_defaults_to_pipe() -> Result<()> {
    let config: ReaderConfig =
        serde_json::from_str(r#"{"multiplex": {"column": "colors", "new_column": "color"}}"#)?;
    assert_eq!(
        config.multiplex,
        Some(Multiplexer::new("colors").rename("color"))
    );

    let explicit = Multiplexer::new("tags").separator(";");
    assert_eq!(explicit.separator, ";");
    assert_eq!(explicit.new_column, None);
    Ok(())
}

#[test]
fn configs_survive_serialization() -> Result<()> {
    let config = WriterConfig {
        dialect: Dialect {
            quoting: QuoteStyle::Always,
            ..Dialect::tsv()
        },
        append: true,
        ..Default::default()
    };
    let json = serde_json::to_string(&config)?;
    let back: WriterConfig = serde_json::from_str(&json)?;
    assert_eq!(back, config);
    assert!(!ReaderConfig::headerless().has_headers);
    Ok(())
}
