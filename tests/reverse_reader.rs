use anyhow::Result;
use rowflow::{Batch, Dialect, ReverseReader, Row, Writer, WriterConfig};

fn row(cells: &[&str]) -> Row {
    cells.iter().map(|c| c.to_string()).collect()
}

#[test]
fn rows_come_back_last_first() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("abc.csv");
    let mut writer = Writer::create(&path, ["letter", "note"], WriterConfig::default())?;
    writer.writerows([["A", "first"], ["B", "quoted, \"twice\""], ["C", "two\nlines"]])?;
    writer.finish()?;

    let reader = ReverseReader::open(&path, &Dialect::default(), true)?;
    assert_eq!(
        reader.headers().map(|h| h.fieldnames().to_vec()),
        Some(row(&["letter", "note"]))
    );
    let rows: Vec<Row> = reader.collect::<rowflow::Result<_>>()?;
    assert_eq!(
        rows,
        vec![
            row(&["C", "two\nlines"]),
            row(&["B", "quoted, \"twice\""]),
            row(&["A", "first"]),
        ]
    );
    Ok(())
}

#[test]
fn small_windows_stitch_rows_together() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("long.csv");
    let mut writer = Writer::create(&path, ["n", "payload"], WriterConfig::default())?;
    for i in 0..200 {
        writer.writerow(&[i.to_string(), "x".repeat(i % 37)])?;
    }
    writer.finish()?;

    for chunk in [1, 3, 16, 4096] {
        let mut reader = ReverseReader::with_chunk_size(&path, &Dialect::default(), true, chunk)?;
        let ns: Vec<String> = reader.cells("n")?.collect::<rowflow::Result<_>>()?;
        let expected: Vec<String> = (0..200).rev().map(|i: usize| i.to_string()).collect();
        assert_eq!(ns, expected, "chunk size {chunk}");
    }
    Ok(())
}

#[test]
fn last_cell_reads_the_final_row() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("people.csv");
    std::fs::write(&path, "id,name\n1,Mary\n2,John\n")?;

    assert_eq!(ReverseReader::last_cell(&path, "name")?, Some("John".to_string()));
    assert_eq!(ReverseReader::last_cell(&path, 0usize)?, Some("2".to_string()));
    assert!(ReverseReader::last_cell(&path, "age").is_err());
    Ok(())
}

#[test]
fn last_cell_without_data_is_none() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let header_only = tmp.path().join("header.csv");
    std::fs::write(&header_only, "id,name\n")?;
    assert_eq!(ReverseReader::last_cell(&header_only, "name")?, None);

    let empty = tmp.path().join("empty.csv");
    std::fs::write(&empty, "")?;
    assert_eq!(ReverseReader::last_cell(&empty, "name")?, None);
    Ok(())
}

#[test]
fn missing_trailing_newline_is_fine() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("people.csv");
    std::fs::write(&path, "id\r\n1\r\n2")?;
    let reader = ReverseReader::open(&path, &Dialect::default(), true)?;
    let rows: Vec<Row> = reader.collect::<rowflow::Result<_>>()?;
    assert_eq!(rows, vec![row(&["2"]), row(&["1"])]);
    Ok(())
}

#[test]
fn headerless_files_are_read_whole() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("raw.csv");
    std::fs::write(&path, "a,1\nb,2\n")?;
    assert_eq!(
        ReverseReader::last_cell_with(&path, 1usize, &Dialect::default(), false)?,
        Some("2".to_string())
    );
    let reader = ReverseReader::open(&path, &Dialect::default(), false)?;
    assert_eq!(reader.count(), 2);
    Ok(())
}

#[test]
fn last_batch_follows_the_cursor_trail() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let dialect = Dialect::default();

    let finished = tmp.path().join("finished.csv");
    std::fs::write(&finished, "name,item,cursor\njohn,a,\njohn,b,p2\njohn,,end\n")?;
    let batch = ReverseReader::last_batch(&finished, "name", "cursor", "end", &dialect)?;
    assert_eq!(
        batch,
        Some(Batch {
            value: "john".to_string(),
            finished: true,
            cursor: None,
            rows: Vec::new(),
        })
    );

    let paginated = tmp.path().join("paginated.csv");
    std::fs::write(
        &paginated,
        "name,item,cursor\nann,z,\nann,,end\njohn,a,\njohn,b,p2\njohn,c,\n",
    )?;
    let batch = ReverseReader::last_batch(&paginated, "name", "cursor", "end", &dialect)?
        .expect("a trail");
    assert_eq!(batch.value, "john");
    assert!(!batch.finished);
    assert_eq!(batch.cursor.as_deref(), Some("p2"));
    assert_eq!(batch.rows, vec![row(&["john", "c", ""])]);

    let torn_first_page = tmp.path().join("torn.csv");
    std::fs::write(&torn_first_page, "name,item,cursor\nann,,end\njohn,a,\n")?;
    let batch = ReverseReader::last_batch(&torn_first_page, "name", "cursor", "end", &dialect)?
        .expect("a trail");
    assert_eq!(batch.value, "john");
    assert_eq!(batch.cursor, None);
    assert!(!batch.finished);

    let header_only = tmp.path().join("header.csv");
    std::fs::write(&header_only, "name,item,cursor\n")?;
    assert_eq!(
        ReverseReader::last_batch(&header_only, "name", "cursor", "end", &dialect)?,
        None
    );
    Ok(())
}

#[cfg(feature = "compression-gzip")]
#[test]
fn compressed_files_fall_back_to_a_forward_scan() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("people.csv.gz");
    let mut writer = Writer::create(&path, ["id"], WriterConfig::default())?;
    writer.writerows([["1"], ["2"], ["3"]])?;
    writer.finish()?;

    assert!(ReverseReader::open(&path, &Dialect::default(), true).is_err());
    assert_eq!(ReverseReader::last_cell(&path, "id")?, Some("3".to_string()));
    Ok(())
}
