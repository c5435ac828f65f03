use super::*;
use crate::test_support::pdf_with_pages;

#[test]
fn reads_pages_in_order() {
    let bytes = pdf_with_pages(&["First page text", "Second page text"]);
    let pdf = PdfText::from_bytes(&bytes).expect("PDF parses");

    assert_eq!(pdf.page_count(), 2);
    assert!(pdf.page_text(0).expect("page 0").contains("First page text"));
    assert!(pdf.page_text(1).expect("page 1").contains("Second page text"));
}

#[test]
fn out_of_range_page_is_invalid_input() {
    let bytes = pdf_with_pages(&["Only page"]);
    let pdf = PdfText::from_bytes(&bytes).expect("PDF parses");
    assert!(matches!(pdf.page_text(1), Err(RagError::InvalidInput(_))));
}

#[test]
fn opens_pdf_on_disk() {
    let dir = tempfile::TempDir::new().expect("tempdir");
    let path = dir.path().join("three.pdf");
    std::fs::write(&path, pdf_with_pages(&["a", "b", "c"])).expect("write PDF");

    assert_eq!(PdfText::open(&path).expect("PDF opens").page_count(), 3);
}

#[test]
fn rejects_non_pdf_bytes() {
    assert!(matches!(
        PdfText::from_bytes(b"definitely not a pdf"),
        Err(RagError::Ingestion(_))
    ));
}

#[test]
fn paged_text_serves_pages() {
    let source = PagedText::new(["one", "two"]);
    assert_eq!(source.page_count(), 2);
    assert_eq!(source.page_text(1).expect("page 1"), "two");
    assert!(source.page_text(2).is_err());
}
