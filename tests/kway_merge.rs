use anyhow::Result;
use rowflow::{Error, Reader, ReaderConfig, Row, Source, kway_merge, kway_merge_by_column};

fn table(header: &[&str], rows: &[&[&str]]) -> Result<Reader> {
    let rows: Vec<Row> = std::iter::once(header)
        .chain(rows.iter().copied())
        .map(|row| row.iter().map(|c| c.to_string()).collect())
        .collect();
    Ok(Reader::new(Source::rows(rows), ReaderConfig::default())?)
}

#[test]
fn merges_sorted_tables_by_column() -> Result<()> {
    let readers = vec![
        table(&["name", "n"], &[&["ann", "1"], &["dan", "4"]])?,
        table(&["n", "name"], &[&["2", "bob"], &["5", "eve"], &["6", "fay"]])?,
        table(&["name", "n"], &[&["cat", "3"]])?,
    ];

    let merged: Vec<(Row, usize)> =
        kway_merge_by_column(readers, "name")?.collect::<rowflow::Result<_>>()?;
    let order: Vec<(&str, usize)> = merged
        .iter()
        .map(|(row, source)| {
            let name = if *source == 1 { &row[1] } else { &row[0] };
            (name.as_str(), *source)
        })
        .collect();
    assert_eq!(
        order,
        vec![("ann", 0), ("bob", 1), ("cat", 2), ("dan", 0), ("eve", 1), ("fay", 1)]
    );
    Ok(())
}

#[test]
fn ties_keep_reader_order() -> Result<()> {
    let readers = vec![
        table(&["k", "tag"], &[&["1", "a0"], &["2", "a1"]])?,
        table(&["k", "tag"], &[&["1", "b0"], &["2", "b1"]])?,
    ];
    let tags: Vec<String> = kway_merge_by_column(readers, "k")?
        .map(|item| item.map(|(row, _)| row[1].clone()))
        .collect::<rowflow::Result<_>>()?;
    assert_eq!(tags, vec!["a0", "b0", "a1", "b1"]);
    Ok(())
}

#[test]
fn custom_key_orders_numerically() -> Result<()> {
    let readers = vec![
        table(&["n"], &[&["2"], &["10"]])?,
        table(&["n"], &[&["9"], &["100"]])?,
    ];
    let values: Vec<String> = kway_merge(readers, |_, row: &Row| {
        row[0].parse::<u64>().unwrap_or(u64::MAX)
    })
    .map(|item| item.map(|(row, _)| row[0].clone()))
    .collect::<rowflow::Result<_>>()?;
    assert_eq!(values, vec!["2", "9", "10", "100"]);
    Ok(())
}

#[test]
fn missing_column_is_reported() -> Result<()> {
    let readers = vec![table(&["a"], &[])?, table(&["b"], &[])?];
    assert!(matches!(
        kway_merge_by_column(readers, "a"),
        Err(Error::ColumnNotFound { .. })
    ));
    Ok(())
}

#[test]
fn parse_errors_end_the_merge() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let broken = tmp.path().join("broken.csv");
    std::fs::write(&broken, "k\n1\n2,extra\n3\n")?;
    let readers = vec![Reader::from_path(&broken)?, table(&["k"], &[&["0"], &["5"]])?];

    let mut merge = kway_merge_by_column(readers, "k")?;
    assert_eq!(merge.next().transpose()?.map(|(row, _)| row), Some(vec!["0".to_string()]));
    assert!(matches!(merge.next(), Some(Err(Error::Parse { .. }))));
    assert!(merge.next().is_none());
    Ok(())
}
