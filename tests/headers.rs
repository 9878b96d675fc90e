use anyhow::Result;
use rowflow::{ColumnRef, Error, HeaderIndex};

fn duplicated() -> HeaderIndex {
    HeaderIndex::new(["id", "name", "tag", "name", "tag", "name"])
}

#[test]
fn duplicate_names_resolve_to_distinct_positions() -> Result<()> {
    let headers = duplicated();
    let positions: Vec<usize> = (0..headers.count("name"))
        .map(|k| headers.resolve(&("name", k).into()))
        .collect::<rowflow::Result<_>>()?;
    assert_eq!(positions, vec![1, 3, 5]);

    assert_eq!(
        headers.resolve(&"name".into())?,
        headers.resolve(&("name", 0usize).into())?
    );
    assert_eq!(headers.nth("tag", 1), Some(4));
    Ok(())
}

#[test]
fn missing_occurrence_is_column_not_found() {
    let headers = duplicated();
    let err = headers.resolve(&("name", 3usize).into()).unwrap_err();
    assert!(matches!(err, Error::ColumnNotFound { .. }));
    assert!(headers.resolve(&ColumnRef::Position(6)).is_err());
    assert!(headers.resolve(&"missing".into()).is_err());
}

#[test]
fn position_lookups() {
    let headers = duplicated();
    assert_eq!(headers.name(2), Some("tag"));
    assert_eq!(headers.name(99), None);
    assert_eq!(headers.len(), 6);
    assert!(headers.contains("id"));
    assert!(!headers.contains("ID"));
}

#[test]
fn select_keeps_order_and_repetition() -> Result<()> {
    let headers = duplicated();
    let selection = headers.select(&[
        ColumnRef::from("tag"),
        ColumnRef::from(0usize),
        ColumnRef::from("tag"),
        ColumnRef::from(("name", 2usize)),
    ])?;
    assert_eq!(selection, vec![2, 0, 2, 5]);

    assert!(headers.select(&["id", "nope"]).is_err());
    Ok(())
}

#[test]
fn rename_only_touches_first_occurrence() -> Result<()> {
    let mut headers = duplicated();
    headers.rename("name", "first_name")?;

    assert_eq!(headers.len(), 6);
    assert_eq!(headers.get("first_name"), Some(1));
    assert_eq!(headers.get("name"), Some(3));
    assert_eq!(headers.count("name"), 2);
    assert_eq!(headers.fieldnames()[1], "first_name");

    assert!(headers.rename("absent", "x").is_err());
    Ok(())
}

#[test]
fn row_view_reads_cells_by_name() -> Result<()> {
    let headers = HeaderIndex::new(["name", "city"]);
    let row = vec!["Mary".to_string(), "Lyon".to_string()];
    let view = headers.wrap(&row);

    assert_eq!(view.get("city"), Some("Lyon"));
    assert_eq!(view.at(0), Some("Mary"));
    assert_eq!(view.cell(&1usize.into())?, "Lyon");
    assert_eq!(view.get("country"), None);
    assert_eq!(view.row(), row.as_slice());
    Ok(())
}

#[test]
fn iter_and_map() {
    let headers = HeaderIndex::new(["a", "b", "a"]);
    let pairs: Vec<(&str, usize)> = headers.iter().collect();
    assert_eq!(pairs, vec![("a", 0), ("b", 1), ("a", 2)]);

    let map = headers.as_map();
    assert_eq!(map.len(), 2);
    assert_eq!(map["a"], 0);
}
