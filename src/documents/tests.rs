use super::*;
use std::fs;
use tempfile::TempDir;

/// Reads files as UTF-8 so tests don't need real PDFs
struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).map_err(|e| RagError::Ingestion(e.to_string()))
    }
}

fn write(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).expect("should write test file");
}

#[test]
fn loads_pdfs_sorted_by_path() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    write(temp_dir.path(), "b.pdf", "second document");
    write(temp_dir.path(), "a.PDF", "first document");
    write(temp_dir.path(), "notes.txt", "not a pdf");

    let documents =
        load_documents(temp_dir.path(), &PlainTextExtractor).expect("should load documents");

    assert_eq!(documents.len(), 2);
    assert_eq!(documents[0].source, temp_dir.path().join("a.PDF"));
    assert_eq!(documents[0].text, "first document");
    assert_eq!(documents[1].source, temp_dir.path().join("b.pdf"));
}

#[test]
fn skips_empty_and_unreadable_files() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    write(temp_dir.path(), "blank.pdf", "   \n ");
    fs::write(temp_dir.path().join("binary.pdf"), [0xff, 0xfe, 0x00])
        .expect("should write binary file");
    write(temp_dir.path(), "good.pdf", "content");

    let documents =
        load_documents(temp_dir.path(), &PlainTextExtractor).expect("should load documents");

    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].text, "content");
}

#[test]
fn missing_directory_is_an_ingestion_error() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let result = load_documents(&temp_dir.path().join("nope"), &PlainTextExtractor);
    assert!(matches!(result, Err(RagError::Ingestion(_))));
}

#[test]
fn directory_without_pdfs_is_an_ingestion_error() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    write(temp_dir.path(), "readme.md", "# nothing here");
    fs::create_dir(temp_dir.path().join("nested.pdf")).expect("should create dir");

    let result = load_documents(temp_dir.path(), &PlainTextExtractor);
    match result {
        Err(RagError::Ingestion(message)) => assert!(message.contains("No readable PDF")),
        other => panic!("expected ingestion error, got {:?}", other),
    }
}

#[test]
fn pdf_extractor_rejects_garbage() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    write(temp_dir.path(), "fake.pdf", "this is not a pdf file");

    let result = PdfTextExtractor.extract(&temp_dir.path().join("fake.pdf"));
    assert!(matches!(result, Err(RagError::Ingestion(_))));
}
