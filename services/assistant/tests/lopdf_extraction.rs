//! Extraction and the hub against a real PDF built in memory with `lopdf`.

use std::sync::Arc;

use assistant_lib::adapters::{LopdfDecoder, OpenAiGenerationAdapter};
use bytes::Bytes;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use pagecite_core::citation::{ProviderKind, ProviderSettings};
use pagecite_core::domain::{ProcessingState, Role};
use pagecite_core::extraction::{extract, EMPTY_PAGE_PLACEHOLDER};
use pagecite_core::hub::{Command, Hub, HubServices, UploadFile};
use pagecite_core::ports::DocumentDecoder;

/// One page per entry; an empty entry produces a page without text.
fn build_pdf(pages: &[&str]) -> Vec<u8> {
    let shown = pages
        .iter()
        .map(|text| {
            if text.is_empty() {
                Vec::new()
            } else {
                vec![Operation::new("Tj", vec![Object::string_literal(*text)])]
            }
        })
        .collect();
    build_pdf_showing(shown)
}

/// One page per entry, each drawing its text operations at (72, 700).
fn build_pdf_showing(pages: Vec<Vec<Operation>>) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for shown in pages {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 18.into()]),
            Operation::new("Td", vec![72.into(), 700.into()]),
        ];
        operations.extend(shown);
        operations.push(Operation::new("ET", vec![]));
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

#[tokio::test]
async fn extracts_a_three_page_pdf_with_markers() {
    let bytes = Bytes::from(build_pdf(&["Alpha page", "Beta page", "Gamma page"]));

    let extraction = extract(&LopdfDecoder::new(), bytes).await.unwrap();

    assert_eq!(extraction.page_count, 3);
    let first = extraction.text.find("[Page 1]").unwrap();
    let second = extraction.text.find("[Page 2]").unwrap();
    let third = extraction.text.find("[Page 3]").unwrap();
    assert!(first < second && second < third);
    assert!(!extraction.text.contains("[Page 4]"));
    assert!(extraction.text[second..third].contains("Beta page"));
}

#[tokio::test]
async fn image_only_pages_keep_their_marker() {
    let bytes = Bytes::from(build_pdf(&["Text", ""]));

    let extraction = extract(&LopdfDecoder::new(), bytes).await.unwrap();

    assert_eq!(extraction.page_count, 2);
    assert!(extraction.text.contains("[Page 2]"));
    assert!(extraction.text.ends_with(EMPTY_PAGE_PLACEHOLDER));
}

#[tokio::test]
async fn kerned_word_gaps_are_read_as_spaces() {
    let words = Object::Array(vec![
        Object::string_literal("Revenue"),
        Object::Integer(-600),
        Object::string_literal("grew"),
        Object::Integer(-600),
        Object::string_literal("sharply"),
    ]);
    let bytes = Bytes::from(build_pdf_showing(vec![vec![Operation::new("TJ", vec![words])]]));

    let extraction = extract(&LopdfDecoder::new(), bytes).await.unwrap();

    assert!(extraction.text.contains("Revenue grew sharply"));
}

#[tokio::test]
async fn reports_positions_and_inherited_geometry() {
    let bytes = Bytes::from(build_pdf(&["Alpha page"]));
    let document = LopdfDecoder::new().open(bytes).await.unwrap();

    let fragments = document.text_fragments(1).await.unwrap();
    assert_eq!(fragments.len(), 1);
    assert_eq!(fragments[0].text, "Alpha page");
    assert_eq!((fragments[0].x, fragments[0].y), (72.0, 700.0));

    let geometry = document.page_geometry(1, 2.0).await.unwrap();
    assert_eq!((geometry.width, geometry.height), (1190.0, 1684.0));
    assert!(document.text_fragments(2).await.is_err());
}

#[tokio::test]
async fn demo_answers_cite_a_page_of_the_uploaded_pdf() {
    let (handle, _task) = Hub::spawn(HubServices {
        decoder: Arc::new(LopdfDecoder::new()),
        generator: Arc::new(OpenAiGenerationAdapter::new()),
        provider: ProviderSettings::for_kind(ProviderKind::OpenAi),
    });

    handle
        .send(Command::Upload(vec![
            UploadFile::new("spec.pdf", None, build_pdf(&["One", "Two", "Three"])),
            UploadFile::new("junk.pdf", None, b"not a pdf".to_vec()),
        ]))
        .unwrap();
    let snapshot = handle
        .wait_for(|s| s.documents.len() == 2 && s.documents.iter().all(|d| d.state.is_terminal()))
        .await
        .unwrap();
    let spec = snapshot.documents.iter().find(|d| d.name == "spec.pdf").unwrap();
    assert_eq!(spec.state, ProcessingState::Ready);
    assert_eq!(spec.page_count, 3);
    let junk = snapshot.documents.iter().find(|d| d.name == "junk.pdf").unwrap();
    assert!(matches!(junk.state, ProcessingState::Failed(_)));

    handle
        .send(Command::SubmitQuestion("What is on page two?".into()))
        .unwrap();
    let snapshot = handle
        .wait_for(|s| s.messages.len() == 2 && !s.is_thinking)
        .await
        .unwrap();

    let answer = &snapshot.messages[1];
    assert_eq!(answer.role, Role::Assistant);
    let citation = answer.citation.clone().unwrap();
    assert_eq!(citation.document_name, "spec.pdf");
    assert!((1..=3).contains(&citation.page_number));

    handle.send(Command::ClickCitation(citation.clone())).unwrap();
    let snapshot = handle.wait_for(|s| s.navigation.is_some()).await.unwrap();
    let navigation = snapshot.navigation.unwrap();
    assert_eq!(navigation.document_id, spec.id);
    assert_eq!(navigation.page, citation.page_number);
}
