use anyhow::Result;
use rowflow::{
    BatchEnricher, BatchResumer, EnricherConfig, Error, ResumePhase, ResumeState, Row,
};
use std::path::PathBuf;

fn names(dir: &tempfile::TempDir) -> Result<PathBuf> {
    let path = dir.path().join("names.csv");
    std::fs::write(&path, "name\njohn\nmary\nzed\n")?;
    Ok(path)
}

fn items() -> EnricherConfig {
    EnricherConfig::default().add(["item"])
}

/// Pages served by a fake paginated API.
fn fetch(name: &str, cursor: Option<&str>) -> (Vec<Vec<String>>, Option<String>) {
    fn page(items: &[&str]) -> Vec<Vec<String>> {
        items.iter().map(|i| vec![i.to_string()]).collect()
    }
    match (name, cursor) {
        ("john", None) => (page(&["a", "b"]), Some("p2".to_string())),
        ("john", Some("p2")) => (page(&["c"]), None),
        ("zed", None) => (page(&["z1"]), None),
        _ => (Vec::new(), None),
    }
}

#[test]
fn pages_are_written_with_their_cursor_trail() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = names(&tmp)?;
    let output = tmp.path().join("out.csv");

    let mut enricher = BatchEnricher::new(&input, &output, "name", items())?;
    assert_eq!(
        enricher.output_fieldnames().map(<[String]>::to_vec),
        Some(vec!["name".to_string(), "item".to_string(), "cursor".to_string()])
    );
    while let Some(item) = enricher.next() {
        let (row, mut cursor) = item?;
        loop {
            let (results, next) = fetch(&row[0], cursor.as_deref());
            enricher.writebatch(&row, &results, next.as_deref())?;
            match next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
    }
    enricher.finish()?;

    assert_eq!(
        std::fs::read_to_string(&output)?,
        "name,item,cursor\njohn,a,\njohn,b,p2\njohn,c,\njohn,,end\nmary,,end\nzed,z1,\nzed,,end\n"
    );
    Ok(())
}

#[test]
fn interrupted_pagination_resumes_from_its_cursor() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = names(&tmp)?;
    let output = tmp.path().join("out.csv");

    // First run stops right after john's first page.
    let mut first = BatchEnricher::with_resumer(&input, BatchResumer::new(&output, "name"), items())?;
    assert_eq!(first.phase(), ResumePhase::Fresh);
    let (row, cursor) = first.next().transpose()?.expect("john");
    assert_eq!(cursor, None);
    let (results, next) = fetch(&row[0], None);
    first.writebatch(&row, &results, next.as_deref())?;
    first.finish()?;

    let mut second = BatchEnricher::with_resumer(&input, BatchResumer::new(&output, "name"), items())?;
    assert_eq!(second.already_done_count(), 0);
    assert_eq!(second.phase(), ResumePhase::Resuming);
    let mut resumed = Vec::new();
    while let Some(item) = second.next() {
        let (row, mut cursor) = item?;
        resumed.push((row[0].clone(), cursor.clone()));
        loop {
            let (results, next) = fetch(&row[0], cursor.as_deref());
            second.writebatch(&row, &results, next.as_deref())?;
            match next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
    }
    second.finish()?;

    assert_eq!(
        resumed,
        vec![
            ("john".to_string(), Some("p2".to_string())),
            ("mary".to_string(), None),
            ("zed".to_string(), None),
        ]
    );
    assert_eq!(
        std::fs::read_to_string(&output)?,
        "name,item,cursor\njohn,a,\njohn,b,p2\njohn,c,\njohn,,end\nmary,,end\nzed,z1,\nzed,,end\n"
    );

    let mut third = BatchEnricher::with_resumer(&input, BatchResumer::new(&output, "name"), items())?;
    assert_eq!(third.already_done_count(), 3);
    assert!(third.next().is_none());
    Ok(())
}

#[test]
fn torn_page_is_reported_and_fetched_again() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = names(&tmp)?;
    let output = tmp.path().join("out.csv");
    std::fs::write(
        &output,
        "name,item,cursor\njohn,a,\njohn,,end\nmary,m1,\nmary,m2,p2\nmary,m3,\n",
    )?;

    let mut enricher = BatchEnricher::with_resumer(&input, BatchResumer::new(&output, "name"), items())?;
    assert_eq!(enricher.already_done_count(), 1);
    match enricher.resume_state() {
        ResumeState::Batch(batch) => {
            assert_eq!(batch.value, "mary");
            assert_eq!(batch.cursor.as_deref(), Some("p2"));
            let torn: Vec<Row> = vec![vec!["mary".into(), "m3".into(), String::new()]];
            assert_eq!(batch.rows, torn);
        }
        other => panic!("unexpected state {other:?}"),
    }

    let (row, cursor) = enricher.next().transpose()?.expect("mary");
    assert_eq!(row, vec!["mary".to_string()]);
    assert_eq!(cursor.as_deref(), Some("p2"));
    match enricher.resume_state() {
        ResumeState::Batch(batch) => assert_eq!(batch.rows.len(), 1, "torn rows outlive the first fetch"),
        other => panic!("unexpected state {other:?}"),
    }
    let (row, cursor) = enricher.next().transpose()?.expect("zed");
    assert_eq!(row, vec!["zed".to_string()]);
    assert_eq!(cursor, None);
    Ok(())
}

#[test]
fn finished_last_row_is_skipped() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = names(&tmp)?;
    let output = tmp.path().join("out.csv");
    std::fs::write(&output, "name,item,cursor\njohn,a,\njohn,,end\nmary,,end\n")?;

    let mut enricher = BatchEnricher::with_resumer(&input, BatchResumer::new(&output, "name"), items())?;
    assert_eq!(enricher.already_done_count(), 2);
    let (row, cursor) = enricher.next().transpose()?.expect("zed");
    assert_eq!((row[0].as_str(), cursor), ("zed", None));
    Ok(())
}

#[test]
fn unknown_last_value_cannot_resume() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = names(&tmp)?;
    let output = tmp.path().join("out.csv");
    std::fs::write(&output, "name,item,cursor\nbob,x,\n")?;

    let result = BatchEnricher::with_resumer(&input, BatchResumer::new(&output, "name"), items());
    assert!(matches!(result, Err(Error::Resume(_))));
    Ok(())
}

#[test]
fn output_without_cursor_column_cannot_resume() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = names(&tmp)?;
    let output = tmp.path().join("out.csv");
    std::fs::write(&output, "name,item\njohn,a\n")?;

    let result = BatchEnricher::with_resumer(&input, BatchResumer::new(&output, "name"), items());
    assert!(matches!(result, Err(Error::Resume(_))));
    Ok(())
}

#[test]
fn empty_page_with_cursor_records_the_cursor() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = names(&tmp)?;
    let output = tmp.path().join("out.csv");

    let mut enricher = BatchEnricher::new(&input, &output, "name", items())?;
    let (row, _) = enricher.next().transpose()?.expect("john");
    let empty: Vec<[&str; 1]> = Vec::new();
    enricher.writebatch(&row, &empty, Some("p9"))?;

    let err = enricher.writebatch(&row, &[["x"]], Some("end")).unwrap_err();
    assert!(matches!(err, Error::Resume(_)));
    let err = enricher.writebatch(&row, &[["x", "y"]], None).unwrap_err();
    assert!(matches!(err, Error::WriteArity { expected: 1, got: 2 }));
    enricher.finish()?;

    assert_eq!(std::fs::read_to_string(&output)?, "name,item,cursor\njohn,,p9\n");
    Ok(())
}

#[test]
fn value_column_must_be_kept_in_the_output() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let input = tmp.path().join("people.csv");
    std::fs::write(&input, "id,name\n1,john\n")?;
    let output = tmp.path().join("out.csv");

    let config = items().select(["id"]);
    assert!(matches!(
        BatchEnricher::new(&input, &output, "name", config),
        Err(Error::ColumnNotFound { .. })
    ));
    assert!(matches!(
        BatchEnricher::new(&input, &output, "missing", items()),
        Err(Error::ColumnNotFound { .. })
    ));
    Ok(())
}
