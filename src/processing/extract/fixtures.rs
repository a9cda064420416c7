//! In-memory PDF and DOCX builders shared by unit tests.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;

/// Image XObject placed on a test page.
pub(crate) enum PdfImage {
    /// JPEG bytes stored with `DCTDecode`.
    Jpeg(Vec<u8>),
    /// Raw 8-bit RGB pixels without a filter.
    Rgb {
        width: u32,
        height: u32,
        pixels: Vec<u8>,
    },
    /// Form XObject drawing the nested images.
    Form(Vec<PdfImage>),
}

/// PDF with one page per entry, each showing the given text.
pub(crate) fn pdf_with_pages(texts: &[&str]) -> Vec<u8> {
    let pages: Vec<(&str, Vec<PdfImage>)> =
        texts.iter().map(|text| (*text, Vec::new())).collect();
    pdf_with_images(&pages)
}

/// PDF with one page per entry, each showing its text and drawing its images.
pub(crate) fn pdf_with_images(pages: &[(&str, Vec<PdfImage>)]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });

    let mut kids = Vec::with_capacity(pages.len());
    for (text, images) in pages {
        let mut operations = Vec::new();
        if !text.is_empty() {
            operations.extend([
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), Object::Integer(12)]),
                Operation::new("Td", vec![Object::Integer(72), Object::Integer(720)]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ]);
        }
        let (xobjects, draws) = add_xobjects(&mut doc, images);
        operations.extend(draws);

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode page content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
                "XObject" => xobjects,
            },
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).expect("save pdf");
    buffer
}

/// Re-save a PDF with every stream that shrinks under zlib stored as `FlateDecode`.
pub(crate) fn flate_compressed(pdf: &[u8]) -> Vec<u8> {
    let mut doc = Document::load_mem(pdf).expect("load pdf");
    doc.compress();
    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).expect("save pdf");
    buffer
}

fn add_xobjects(doc: &mut Document, images: &[PdfImage]) -> (Dictionary, Vec<Operation>) {
    let mut xobjects = Dictionary::new();
    let mut draws = Vec::with_capacity(images.len());
    for (position, image) in images.iter().enumerate() {
        let name = format!("Im{}", position + 1);
        let id = add_xobject(doc, image);
        xobjects.set(name.clone(), id);
        draws.push(Operation::new("Do", vec![Object::Name(name.into_bytes())]));
    }
    (xobjects, draws)
}

fn add_xobject(doc: &mut Document, image: &PdfImage) -> ObjectId {
    match image {
        PdfImage::Jpeg(bytes) => doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => Object::Integer(1),
                "Height" => Object::Integer(1),
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => Object::Integer(8),
                "Filter" => "DCTDecode",
            },
            bytes.clone(),
        )),
        PdfImage::Rgb {
            width,
            height,
            pixels,
        } => doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => Object::Integer(i64::from(*width)),
                "Height" => Object::Integer(i64::from(*height)),
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => Object::Integer(8),
            },
            pixels.clone(),
        )),
        PdfImage::Form(nested) => {
            let (xobjects, operations) = add_xobjects(doc, nested);
            let content = Content { operations };
            doc.add_object(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Form",
                    "BBox" => vec![
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Integer(10),
                        Object::Integer(10),
                    ],
                    "Resources" => dictionary! { "XObject" => xobjects },
                },
                content.encode().expect("encode form content"),
            ))
        }
    }
}

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Default Extension="png" ContentType="image/png"/>
  <Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
</Types>"#;

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
</Relationships>"#;

/// Wrap body XML in a `w:document` root.
pub(crate) fn document_xml(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><w:body>{body}</w:body></w:document>"#
    )
}

/// Relationship part listing `(id, type suffix, target, external)` entries.
pub(crate) fn relationships_xml(entries: &[(&str, &str, &str, bool)]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    for (id, kind, target, external) in entries {
        let mode = if *external {
            r#" TargetMode="External""#
        } else {
            ""
        };
        xml.push_str(&format!(
            r#"<Relationship Id="{id}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/{kind}" Target="{target}"{mode}/>"#
        ));
    }
    xml.push_str("</Relationships>");
    xml
}

/// Paragraph XML with a single run, or an empty paragraph for empty text.
pub(crate) fn paragraph(text: &str) -> String {
    if text.is_empty() {
        return "<w:p/>".to_string();
    }
    format!(
        r#"<w:p><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#,
        escape(text)
    )
}

/// DOCX containing one paragraph per entry.
pub(crate) fn docx_with_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs.iter().map(|text| paragraph(text)).collect();
    docx_from_parts(&document_xml(&body), None, &[])
}

/// DOCX whose paragraphs are followed by images stored under `word/media/`.
pub(crate) fn docx_with_images(paragraphs: &[&str], images: &[&[u8]]) -> Vec<u8> {
    let body: String = paragraphs.iter().map(|text| paragraph(text)).collect();
    let names: Vec<String> = (1..=images.len())
        .map(|n| format!("media/image{n}.png"))
        .collect();
    let ids: Vec<String> = (1..=images.len()).map(|n| format!("rId{}", n + 10)).collect();
    let entries: Vec<(&str, &str, &str, bool)> = ids
        .iter()
        .zip(&names)
        .map(|(id, name)| (id.as_str(), "image", name.as_str(), false))
        .collect();
    let parts: Vec<(String, &[u8])> = names
        .iter()
        .zip(images)
        .map(|(name, bytes)| (format!("word/{name}"), *bytes))
        .collect();
    let parts: Vec<(&str, &[u8])> = parts
        .iter()
        .map(|(name, bytes)| (name.as_str(), *bytes))
        .collect();
    docx_from_parts(
        &document_xml(&body),
        Some(&relationships_xml(&entries)),
        &parts,
    )
}

/// Assemble a DOCX archive from its main part, optional relationships, and extra parts.
pub(crate) fn docx_from_parts(
    document: &str,
    relationships: Option<&str>,
    extra: &[(&str, &[u8])],
) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let mut add = |name: &str, bytes: &[u8]| {
        writer.start_file(name, options).expect("start zip entry");
        writer.write_all(bytes).expect("write zip entry");
    };
    add("[Content_Types].xml", CONTENT_TYPES.as_bytes());
    add("_rels/.rels", PACKAGE_RELS.as_bytes());
    add("word/document.xml", document.as_bytes());
    if let Some(relationships) = relationships {
        add("word/_rels/document.xml.rels", relationships.as_bytes());
    }
    for (name, bytes) in extra {
        add(name, bytes);
    }

    writer.finish().expect("finish zip").into_inner()
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
