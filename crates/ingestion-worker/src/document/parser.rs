use anyhow::{anyhow, Result};
use encoding_rs::UTF_8;
use lopdf::Document as PdfDocument;
use pulldown_cmark::{html, Options, Parser as MdParser};
use scraper::{Html, Selector};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// One page/slide/section worth of extracted text, carrying the locator
/// metadata that survives end-to-end into [`crate::document::chunker::Chunk`]
/// and eventually the `[Source i: filename, Page p]` context markers the
/// query orchestrator builds.
#[derive(Debug, Clone)]
pub struct PageContent {
    pub page_number: Option<i32>,
    pub slide_number: Option<i32>,
    pub section_title: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub pages: Vec<PageContent>,
    pub metadata: DocumentMetadata,
}

impl ParsedDocument {
    pub fn is_empty(&self) -> bool {
        self.pages.iter().all(|p| p.text.trim().is_empty())
    }

    pub fn total_chars(&self) -> usize {
        self.pages.iter().map(|p| p.text.len()).sum()
    }
}

#[derive(Debug, Clone)]
pub struct DocumentMetadata {
    pub file_type: String,
    pub pages: Option<usize>,
    pub encoding: String,
}

pub struct DocumentParser;

impl DocumentParser {
    pub fn parse(path: &Path) -> Result<ParsedDocument> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| anyhow!("no file extension"))?
            .to_lowercase();

        debug!(?path, %extension, "parsing document");

        let parsed = match extension.as_str() {
            "pdf" => Self::parse_pdf(path)?,
            "docx" => Self::parse_docx(path)?,
            "md" => Self::parse_markdown(path)?,
            "html" | "htm" => Self::parse_html(path)?,
            _ => Self::parse_text(path)?,
        };

        debug!(chars = parsed.total_chars(), "parsed document");
        Ok(parsed)
    }

    fn parse_pdf(path: &Path) -> Result<ParsedDocument> {
        let doc = PdfDocument::load(path)?;
        let page_map = doc.get_pages();
        let page_count = page_map.len();

        let mut pages = Vec::with_capacity(page_count);
        for (page_num, _) in page_map.iter() {
            let text = match doc.extract_text(&[*page_num]) {
                Ok(t) => t,
                Err(e) => {
                    warn!(page = page_num, error = %e, "failed to extract page text");
                    String::new()
                }
            };
            pages.push(PageContent {
                page_number: Some(*page_num as i32),
                slide_number: None,
                section_title: None,
                text,
            });
        }

        Ok(ParsedDocument {
            pages,
            metadata: DocumentMetadata {
                file_type: "application/pdf".to_string(),
                pages: Some(page_count),
                encoding: "UTF-8".to_string(),
            },
        })
    }

    /// Extracts paragraph runs from the DOCX document body in order.
    fn parse_docx(path: &Path) -> Result<ParsedDocument> {
        let bytes = fs::read(path)?;
        let docx = docx_rs::read_docx(&bytes).map_err(|e| anyhow!("docx parse error: {e:?}"))?;

        let mut buffer = String::new();

        for child in &docx.document.children {
            if let docx_rs::DocumentChild::Paragraph(paragraph) = child {
                for run_child in &paragraph.children {
                    if let docx_rs::ParagraphChild::Run(run) = run_child {
                        for run_part in &run.children {
                            if let docx_rs::RunChild::Text(text) = run_part {
                                buffer.push_str(&text.text);
                            }
                        }
                    }
                }
                buffer.push('\n');
            }
        }

        let pages = vec![PageContent {
            page_number: None,
            slide_number: None,
            section_title: None,
            text: buffer,
        }];

        Ok(ParsedDocument {
            pages,
            metadata: DocumentMetadata {
                file_type:
                    "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
                        .to_string(),
                pages: None,
                encoding: "UTF-8".to_string(),
            },
        })
    }

    fn parse_markdown(path: &Path) -> Result<ParsedDocument> {
        let raw = fs::read(path)?;
        let (content, encoding) = decode_text(&raw);

        let parser = MdParser::new_ext(&content, Options::all());
        let mut html_output = String::new();
        html::push_html(&mut html_output, parser);
        let text = extract_text_from_html(&html_output)?;

        Ok(ParsedDocument {
            pages: vec![PageContent {
                page_number: None,
                slide_number: None,
                section_title: None,
                text,
            }],
            metadata: DocumentMetadata {
                file_type: "text/markdown".to_string(),
                pages: None,
                encoding: encoding.to_string(),
            },
        })
    }

    fn parse_html(path: &Path) -> Result<ParsedDocument> {
        let raw = fs::read(path)?;
        let (content, encoding) = decode_text(&raw);
        let text = extract_text_from_html(&content)?;

        Ok(ParsedDocument {
            pages: vec![PageContent {
                page_number: None,
                slide_number: None,
                section_title: None,
                text,
            }],
            metadata: DocumentMetadata {
                file_type: "text/html".to_string(),
                pages: None,
                encoding: encoding.to_string(),
            },
        })
    }

    fn parse_text(path: &Path) -> Result<ParsedDocument> {
        let raw = fs::read(path)?;
        let (content, encoding) = decode_text(&raw);

        Ok(ParsedDocument {
            pages: vec![PageContent {
                page_number: None,
                slide_number: None,
                section_title: None,
                text: content,
            }],
            metadata: DocumentMetadata {
                file_type: "text/plain".to_string(),
                pages: None,
                encoding: encoding.to_string(),
            },
        })
    }
}

fn extract_text_from_html(html: &str) -> Result<String> {
    let document = Html::parse_document(html);
    let body_selector = Selector::parse("body").map_err(|e| anyhow!("selector error: {e:?}"))?;

    let mut text = String::new();
    for element in document.select(&body_selector) {
        text.push_str(&element.text().collect::<String>());
    }

    let cleaned = text
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    Ok(cleaned)
}

fn decode_text(bytes: &[u8]) -> (String, &'static str) {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return (text.to_string(), "UTF-8");
    }
    let (cow, _, _) = UTF_8.decode(bytes);
    (cow.into_owned(), "UTF-8")
}
