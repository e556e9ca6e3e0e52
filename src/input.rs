//! Normalising file lists handed over by the driving interface.
//!
//! Drag-and-drop payloads arrive as one string in which paths are separated
//! by spaces and any path containing a space is wrapped in braces:
//! `{C:/My Invoices/a.xml} C:/b.xml`.

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::sync::LazyLock;

static DROP_ENTRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[^}]*\}|[^ {}]+").expect("Invalid drop payload regex"));

/// Split a drag-and-drop payload into individual paths.
pub fn parse_drop_payload(payload: &str) -> Vec<Utf8PathBuf> {
    DROP_ENTRY
        .find_iter(payload)
        .map(|m| {
            let entry = m.as_str();
            entry
                .strip_prefix('{')
                .and_then(|inner| inner.strip_suffix('}'))
                .unwrap_or(entry)
        })
        .filter(|entry| !entry.trim().is_empty())
        .map(Utf8PathBuf::from)
        .collect()
}

/// Case-insensitive `.xml` extension check.
pub fn is_xml_path(path: &Utf8Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
}

/// Paths from `candidates` that are XML files not already in `queued`.
///
/// Order is preserved and duplicates within `candidates` are dropped too.
pub fn accept_xml_files<I>(candidates: I, queued: &[Utf8PathBuf]) -> Vec<Utf8PathBuf>
where
    I: IntoIterator<Item = Utf8PathBuf>,
{
    let mut accepted: Vec<Utf8PathBuf> = Vec::new();

    for path in candidates {
        if !is_xml_path(&path) {
            tracing::debug!("Ignoring non-XML file: {}", path);
            continue;
        }
        if queued.contains(&path) || accepted.contains(&path) {
            continue;
        }
        accepted.push(path);
    }

    accepted
}

/// XML files directly inside `dir`, sorted by name.
pub fn xml_files_in(dir: &Utf8Path) -> std::io::Result<Vec<Utf8PathBuf>> {
    let mut files: Vec<Utf8PathBuf> = dir
        .read_dir_utf8()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.into_path())
        .filter(|path| path.is_file() && is_xml_path(path))
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_and_braced_entries() {
        let paths = parse_drop_payload("{C:/My Invoices/a.xml} C:/b.xml /tmp/c d.xml");
        assert_eq!(
            paths,
            vec![
                Utf8PathBuf::from("C:/My Invoices/a.xml"),
                Utf8PathBuf::from("C:/b.xml"),
                Utf8PathBuf::from("/tmp/c"),
                Utf8PathBuf::from("d.xml"),
            ]
        );
    }

    #[test]
    fn test_parse_empty_payload() {
        assert!(parse_drop_payload("").is_empty());
        assert!(parse_drop_payload("   {} ").is_empty());
    }

    #[test]
    fn test_is_xml_path() {
        assert!(is_xml_path(Utf8Path::new("invoice.xml")));
        assert!(is_xml_path(Utf8Path::new("/data/INVOICE.XML")));
        assert!(!is_xml_path(Utf8Path::new("invoice.pdf")));
        assert!(!is_xml_path(Utf8Path::new("xml")));
    }

    #[test]
    fn test_accept_filters_and_dedupes() {
        let queued = vec![Utf8PathBuf::from("/in/a.xml")];
        let accepted = accept_xml_files(
            [
                Utf8PathBuf::from("/in/a.xml"),
                Utf8PathBuf::from("/in/b.xml"),
                Utf8PathBuf::from("/in/notes.txt"),
                Utf8PathBuf::from("/in/b.xml"),
                Utf8PathBuf::from("/in/c.XML"),
            ],
            &queued,
        );
        assert_eq!(
            accepted,
            vec![Utf8PathBuf::from("/in/b.xml"), Utf8PathBuf::from("/in/c.XML")]
        );
    }

    #[test]
    fn test_xml_files_in_directory() {
        let temp = tempfile::TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        std::fs::write(dir.join("b.xml"), "").unwrap();
        std::fs::write(dir.join("a.xml"), "").unwrap();
        std::fs::write(dir.join("readme.txt"), "").unwrap();
        std::fs::create_dir(dir.join("sub.xml")).unwrap();

        let files = xml_files_in(&dir).unwrap();
        assert_eq!(files, vec![dir.join("a.xml"), dir.join("b.xml")]);
    }
}
