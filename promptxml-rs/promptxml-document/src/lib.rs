use promptxml_parser::ParsedPrompt;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

pub const ROOT_ELEMENT: &str = "civitai-ai-prompt";
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const DEFAULT_SCHEMA_LOCATION: &str = "https://raw.githubusercontent.com/M4jor-Tom/civitai_prompt.xsd/refs/heads/main/civitai_prompt.xsd";
pub const DEFAULT_INDENT_WIDTH: usize = 2;

/// Parameters rendered under `image-parameters`, in output order.
pub const PROJECTED_PARAMETERS: &[&str] = &[
    "width",
    "height",
    "steps",
    "sampler",
    "cfg scale",
    "seed",
    "clip skip",
];

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to write XML: {0}")]
    Write(#[from] std::io::Error),
    #[error("rendered XML is not valid UTF-8")]
    Encoding(#[from] std::string::FromUtf8Error),
    #[error("failed to write XML document to {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct DocumentOptions<'a> {
    pub schema_location: &'a str,
    pub indent_width: usize,
}

impl Default for DocumentOptions<'_> {
    fn default() -> Self {
        Self {
            schema_location: DEFAULT_SCHEMA_LOCATION,
            indent_width: DEFAULT_INDENT_WIDTH,
        }
    }
}

/// Element name for a parameter key: spaces become hyphens.
pub fn element_name(key: &str) -> String {
    key.replace(' ', "-")
}

/// Render a parsed prompt as an indented XML document.
///
/// Only keys listed in [`PROJECTED_PARAMETERS`] are written, in that order.
pub fn render(prompt: &ParsedPrompt, options: &DocumentOptions<'_>) -> Result<String, DocumentError> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', options.indent_width);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

    let root = BytesStart::new(ROOT_ELEMENT).with_attributes([
        ("xmlns:xsi", XSI_NAMESPACE),
        ("xsi:noNamespaceSchemaLocation", options.schema_location),
    ]);
    writer.write_event(Event::Start(root))?;

    writer.write_event(Event::Start(BytesStart::new("prompt-details")))?;
    write_text_element(&mut writer, "positive-prompt", &prompt.positive_prompt)?;
    if let Some(negative) = prompt.negative_prompt.as_deref() {
        write_text_element(&mut writer, "negative-prompt", negative)?;
    }
    writer.write_event(Event::End(BytesEnd::new("prompt-details")))?;

    writer.write_event(Event::Start(BytesStart::new("image-parameters")))?;
    for key in PROJECTED_PARAMETERS {
        if let Some(value) = prompt.parameters.get(key) {
            write_text_element(&mut writer, &element_name(key), value)?;
        }
    }
    writer.write_event(Event::End(BytesEnd::new("image-parameters")))?;

    writer.write_event(Event::End(BytesEnd::new(ROOT_ELEMENT)))?;

    let mut xml = String::from_utf8(writer.into_inner().into_inner())?;
    xml.push('\n');
    Ok(xml)
}

/// Render `prompt` and write it to `path`, replacing any existing file.
pub fn write_document(
    prompt: &ParsedPrompt,
    options: &DocumentOptions<'_>,
    path: &Path,
) -> Result<(), DocumentError> {
    let xml = render(prompt, options)?;

    fs::write(path, xml).map_err(|source| DocumentError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    info!(path = %path.display(), "wrote XML prompt");
    Ok(())
}

fn write_text_element(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    name: &str,
    text: &str,
) -> Result<(), DocumentError> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}
