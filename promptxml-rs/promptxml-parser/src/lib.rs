use thiserror::Error;
use tracing::debug;

pub const NEGATIVE_PROMPT_MARKER: &str = "Negative prompt:";
pub const STEPS_MARKER: &str = "Steps:";
pub const PARAMETER_SEPARATOR: &str = ", ";
pub const STEPS_KEY: &str = "steps";

/// Parameter keys kept by the parser. Anything else in the parameter section is dropped.
pub const RECOGNIZED_KEYS: &[&str] = &[
    "steps",
    "basemodel",
    "quantity",
    "width",
    "height",
    "seed",
    "draft",
    "nsfw",
    "workflow",
    "clip skip",
    "cfg scale",
    "sampler",
    "fluxmode",
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("steps marker missing")]
    MissingStepsMarker,
}

/// Insertion-ordered parameter mapping. Re-inserting a key replaces the value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameters {
    entries: Vec<(String, String)>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPrompt {
    pub positive_prompt: String,
    pub negative_prompt: Option<String>,
    pub parameters: Parameters,
}

pub fn is_recognized_key(key: &str) -> bool {
    RECOGNIZED_KEYS.contains(&key)
}

/// Parse a prompt copied from an image-generation site.
///
/// The text is read as a positive prompt, an optional `Negative prompt:`
/// section, and a parameter list introduced by `Steps:`. Unknown parameter
/// keys and tokens without a colon are dropped.
///
/// # Errors
///
/// Returns [`FormatError::MissingStepsMarker`] when the text has no `Steps:`
/// marker. Every other irregularity degrades to omitted fields.
pub fn parse(text: &str) -> Result<ParsedPrompt, FormatError> {
    let sections = scan_sections(text)?;

    let positive_prompt = sections.positive.trim().to_string();
    let negative_prompt = sections.negative.map(|negative| negative.trim().to_string());
    let parameters = parse_parameters(sections.params);

    debug!(
        has_negative = negative_prompt.is_some(),
        parameter_count = parameters.len(),
        "parsed prompt"
    );

    Ok(ParsedPrompt {
        positive_prompt,
        negative_prompt,
        parameters,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    BeforeNegative,
    InNegative,
    InParams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Sections<'a> {
    positive: &'a str,
    negative: Option<&'a str>,
    params: &'a str,
}

fn scan_sections(text: &str) -> Result<Sections<'_>, FormatError> {
    let mut state = ScanState::BeforeNegative;
    let mut segment_start = 0;
    let mut positive = "";
    let mut negative = None;
    let mut cursor = 0;

    while state != ScanState::InParams && cursor < text.len() {
        let rest = &text[cursor..];

        match state {
            ScanState::BeforeNegative if rest.starts_with(NEGATIVE_PROMPT_MARKER) => {
                positive = &text[segment_start..cursor];
                cursor += NEGATIVE_PROMPT_MARKER.len();
                segment_start = cursor;
                state = ScanState::InNegative;
                continue;
            }
            ScanState::BeforeNegative if rest.starts_with(STEPS_MARKER) => {
                positive = &text[segment_start..cursor];
                cursor += STEPS_MARKER.len();
                segment_start = cursor;
                state = ScanState::InParams;
                continue;
            }
            ScanState::InNegative if rest.starts_with(STEPS_MARKER) => {
                negative = Some(&text[segment_start..cursor]);
                cursor += STEPS_MARKER.len();
                segment_start = cursor;
                state = ScanState::InParams;
                continue;
            }
            _ => {}
        }

        cursor += rest.chars().next().map_or(1, char::len_utf8);
    }

    if state != ScanState::InParams {
        return Err(FormatError::MissingStepsMarker);
    }

    Ok(Sections {
        positive,
        negative,
        params: &text[segment_start..],
    })
}

fn parse_parameters(section: &str) -> Parameters {
    let mut parameters = Parameters::new();

    let (steps, remainder) = section.split_once(',').unwrap_or((section, ""));
    parameters.insert(STEPS_KEY, steps.trim());

    for token in remainder.split(PARAMETER_SEPARATOR) {
        let Some((key, value)) = token.split_once(':') else {
            if !token.trim().is_empty() {
                debug!(token = token.trim(), "dropping parameter token without a key");
            }
            continue;
        };

        let key = key.trim().to_lowercase();
        if !is_recognized_key(&key) {
            debug!(key = %key, "dropping unrecognized parameter");
            continue;
        }

        parameters.insert(key, value.trim());
    }

    parameters
}
