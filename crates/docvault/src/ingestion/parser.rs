//! Multi-format text extraction

use async_trait::async_trait;
use pulldown_cmark::{Event, Parser, TagEnd};
use std::path::Path;

use crate::error::{Error, Result};
use crate::providers::TextExtractor;
use crate::types::FileType;

/// Replace glyphs pdf-extract commonly emits with plain equivalents
fn cleanup_pdf_text(text: &str) -> String {
    text.replace('\u{00A0}', " ") // Non-breaking space
        .replace('\u{2010}', "-")
        .replace('\u{2011}', "-")
        .replace('\u{2013}', "-")
        .replace('\u{2018}', "'")
        .replace('\u{2019}', "'")
        .replace('\u{201C}', "\"")
        .replace('\u{201D}', "\"")
        .replace('\u{FB00}', "ff") // Ligatures
        .replace('\u{FB01}', "fi")
        .replace('\u{FB02}', "fl")
        .replace('\u{FB03}', "ffi")
        .replace('\u{FB04}', "ffl")
        .replace('\0', "")
}

/// Built-in extractor keyed on the file extension
#[derive(Debug, Clone, Copy, Default)]
pub struct FileParser;

impl FileParser {
    /// Create a parser
    pub fn new() -> Self {
        Self
    }

    /// Extract text from in-memory bytes
    pub fn parse(filename: &str, data: &[u8]) -> Result<String> {
        let extension = match filename.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => ext.to_lowercase(),
            _ => String::new(),
        };

        match FileType::from_extension(&extension) {
            FileType::Pdf => Self::parse_pdf(filename, data),
            FileType::Txt | FileType::Code(_) => Self::parse_text(filename, data),
            FileType::Markdown => Self::parse_markdown(filename, data),
            FileType::Html => Self::parse_html(filename, data),
            FileType::Csv => Self::parse_csv(filename, data),
            FileType::Unknown => Err(Error::UnsupportedFileType(if extension.is_empty() {
                "no file extension".to_string()
            } else {
                format!(".{}", extension)
            })),
        }
    }

    fn decode_text(filename: &str, data: &[u8]) -> Result<String> {
        if data.contains(&0) {
            return Err(Error::extraction(filename, "binary content in a text file"));
        }
        Ok(String::from_utf8_lossy(data).into_owned())
    }

    fn parse_text(filename: &str, data: &[u8]) -> Result<String> {
        Self::decode_text(filename, data)
    }

    fn parse_pdf(filename: &str, data: &[u8]) -> Result<String> {
        let raw = pdf_extract::extract_text_from_mem(data)
            .map_err(|e| Error::extraction(filename, e.to_string()))?;

        let content = cleanup_pdf_text(&raw)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        if content.is_empty() {
            return Err(Error::extraction(filename, "no text content could be extracted from PDF"));
        }
        Ok(content)
    }

    /// Markdown with markup removed, block elements separated by newlines
    fn parse_markdown(filename: &str, data: &[u8]) -> Result<String> {
        let source = Self::decode_text(filename, data)?;
        let mut content = String::with_capacity(source.len());

        for event in Parser::new(&source) {
            match event {
                Event::Text(text) | Event::Code(text) => content.push_str(&text),
                Event::SoftBreak | Event::HardBreak => content.push('\n'),
                Event::End(
                    TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item | TagEnd::CodeBlock,
                ) => content.push('\n'),
                _ => {}
            }
        }

        Ok(content.trim_end().to_string())
    }

    fn parse_html(filename: &str, data: &[u8]) -> Result<String> {
        let html = Self::decode_text(filename, data)?;
        let document = scraper::Html::parse_document(&html);
        let body_selector = scraper::Selector::parse("body")
            .map_err(|e| Error::internal(format!("bad selector: {:?}", e)))?;

        let mut content = String::new();
        if let Some(body) = document.select(&body_selector).next() {
            for text in body.text() {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    if !content.is_empty() {
                        content.push(' ');
                    }
                    content.push_str(trimmed);
                }
            }
        }

        Ok(content)
    }

    /// Header and rows, cells joined with " | "
    fn parse_csv(filename: &str, data: &[u8]) -> Result<String> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(data);
        let mut content = String::new();

        for record in reader.records() {
            let record = record.map_err(|e| Error::extraction(filename, e.to_string()))?;
            content.push_str(&record.iter().collect::<Vec<_>>().join(" | "));
            content.push('\n');
        }

        Ok(content)
    }
}

#[async_trait]
impl TextExtractor for FileParser {
    async fn extract_text(&self, path: &Path) -> Result<String> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let data = tokio::fs::read(path).await?;

        // Parsers are CPU-bound and pdf-extract can panic on malformed input
        let task_name = filename.clone();
        tokio::task::spawn_blocking(move || Self::parse(&task_name, &data))
            .await
            .map_err(|e| Error::extraction(filename, format!("parser aborted: {}", e)))?
    }

    fn name(&self) -> &str {
        "builtin"
    }
}
