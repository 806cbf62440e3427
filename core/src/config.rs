//! Run-time configuration and shared constants.
//!
//! The configuration file is a small XML document:
//!
//! ```xml
//! <config>
//!     <tag_mapping pattern="^X\[(.*)\]$" to="Y[$1]"/>
//!     <lemma_mapping pattern="\+.*$" to=""/>
//!     <guessed_marker>?</guessed_marker>
//!     <suffix_model_weight>0.7</suffix_model_weight>
//! </config>
//! ```
//!
//! Replacement strings use the `regex` crate's `$1` group syntax.

use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;

use crate::error::{Error, Result};
use crate::mapper::StringMapper;

/// Sentinel for `log(0)` and for intentionally failed lookups.
pub const UNKNOWN_VALUE: f64 = -99.0;
/// Default log-probability of an unseen tag transition.
pub const UNK_TAG_TRANS: f64 = -99.0;
/// Emission weight of a tag the guesser knows nothing about.
pub const UNKNOWN_TAG_WEIGHT: f64 = -99.0;
/// Emission log-probability when a token admits exactly one tag.
pub const SINGLE_EMISSION_PROB: f64 = 0.0;
/// Emission log-probability of the end-of-sentence pseudo token.
pub const EOS_EMISSION_PROB: f64 = 0.0;

pub const BOS_TAG: &str = "<S>";
pub const EOS_TAG: &str = "</S>";
pub const BOS_TOKEN: &str = "<SB>";
pub const EOS_TOKEN: &str = "<SE>";

/// Optional stem whitelist picked up from the working directory.
pub const STEM_FILTER_FILE: &str = "morphtag_stems.txt";

const TAG_MAPPING: &[u8] = b"tag_mapping";
const LEMMA_MAPPING: &[u8] = b"lemma_mapping";
const GUESSED_MARKER: &[u8] = b"guessed_marker";
const SUFFIX_MODEL_WEIGHT: &[u8] = b"suffix_model_weight";
const PATTERN_ATTR: &[u8] = b"pattern";
const TO_ATTR: &[u8] = b"to";

#[derive(Debug, Clone, Default)]
pub struct Configuration {
    /// Regex rewrites applied to tags unseen in training.
    pub tag_mappings: Vec<(Regex, String)>,
    /// Regex rewrites applied to candidate lemmas ("lemma simplification").
    pub lemma_mappings: Vec<(Regex, String)>,
    /// Prefix attached to lemmas produced without morphology support.
    pub guessed_lemma_marker: String,
    /// Overrides the learned suffix-model weight of the lemma combiner.
    pub suffix_model_weight: Option<f64>,
}

impl Configuration {
    pub fn from_xml_file(path: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_xml_str(&text)
    }

    pub fn from_xml_str(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let mut conf = Configuration::default();
        // Name of the element whose text content is pending.
        let mut pending: Option<&'static str> = None;
        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                    pending = None;
                    match e.name().as_ref() {
                        TAG_MAPPING => {
                            let (pat, to) = read_mapping_attrs(&e)?;
                            conf.tag_mappings.push((compile_pattern(&pat)?, to));
                        }
                        LEMMA_MAPPING => {
                            let (pat, to) = read_mapping_attrs(&e)?;
                            conf.lemma_mappings.push((compile_pattern(&pat)?, to));
                        }
                        GUESSED_MARKER => pending = Some("marker"),
                        SUFFIX_MODEL_WEIGHT => pending = Some("weight"),
                        _ => {}
                    }
                }
                Ok(Event::Text(t)) => {
                    let text = t
                        .unescape()
                        .map_err(|e| Error::Config(e.to_string()))?
                        .trim()
                        .to_string();
                    match pending {
                        Some("marker") if !text.is_empty() => {
                            conf.guessed_lemma_marker = text;
                        }
                        Some("weight") if !text.is_empty() => {
                            let w: f64 = text.parse().map_err(|_| {
                                Error::Config(format!("bad suffix_model_weight: '{}'", text))
                            })?;
                            conf.suffix_model_weight = Some(w);
                        }
                        _ => {}
                    }
                }
                Ok(Event::End(_)) => pending = None,
                Ok(Event::Eof) => break,
                Err(e) => return Err(Error::Config(e.to_string())),
                _ => {}
            }
        }
        Ok(conf)
    }

    /// Lemma simplification mapper, if any lemma mappings are configured.
    pub fn lemma_mapper(&self) -> Option<StringMapper> {
        if self.lemma_mappings.is_empty() {
            None
        } else {
            Some(StringMapper::new(self.lemma_mappings.clone()))
        }
    }
}

fn read_mapping_attrs(e: &quick_xml::events::BytesStart<'_>) -> Result<(String, String)> {
    let mut pattern = None;
    let mut to = None;
    for attr in e.attributes() {
        let attr = attr.map_err(|e| Error::Config(e.to_string()))?;
        let value = attr
            .unescape_value()
            .map_err(|e| Error::Config(e.to_string()))?
            .into_owned();
        match attr.key.as_ref() {
            PATTERN_ATTR => pattern = Some(value),
            TO_ATTR => to = Some(value),
            _ => {}
        }
    }
    match (pattern, to) {
        (Some(p), Some(t)) => Ok((p, t)),
        _ => Err(Error::Config(
            "mapping element needs both 'pattern' and 'to' attributes".to_string(),
        )),
    }
}

fn compile_pattern(pat: &str) -> Result<Regex> {
    Regex::new(pat).map_err(|e| Error::Config(format!("bad pattern '{}': {}", pat, e)))
}

/// Bracket tokens of the inline pre-analysis syntax, configurable through
/// the `--input-separator` flag. The flag value is split by its first
/// character: `"#{{#||#}}#["` yields `{{`, `||`, `}}` and `[`.
#[derive(Debug, Clone)]
pub struct InputSeparators {
    pub open: String,
    pub alt: String,
    pub close: String,
    pub tag_open: String,
}

impl Default for InputSeparators {
    fn default() -> Self {
        Self {
            open: "{{".to_string(),
            alt: "||".to_string(),
            close: "}}".to_string(),
            tag_open: "[".to_string(),
        }
    }
}

impl InputSeparators {
    pub fn parse(spec: &str) -> Result<Self> {
        let mut chars = spec.chars();
        let delim = chars
            .next()
            .ok_or_else(|| Error::Config("empty input separator spec".to_string()))?;
        let rest: &str = &spec[delim.len_utf8()..];
        let parts: Vec<&str> = rest.split(delim).collect();
        if parts.len() != 4 || parts.iter().any(|p| p.is_empty()) {
            return Err(Error::Config(format!(
                "input separator spec needs 4 non-empty parts, got '{}'",
                spec
            )));
        }
        Ok(Self {
            open: parts[0].to_string(),
            alt: parts[1].to_string(),
            close: parts[2].to_string(),
            tag_open: parts[3].to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let xml = r#"<config>
            <tag_mapping pattern="^NOUN$" to="N"/>
            <tag_mapping pattern="^VERB-(.*)$" to="V-$1"/>
            <lemma_mapping pattern="\+Guess$" to=""/>
            <guessed_marker>?</guessed_marker>
            <suffix_model_weight>0.75</suffix_model_weight>
        </config>"#;
        let conf = Configuration::from_xml_str(xml).unwrap();
        assert_eq!(conf.tag_mappings.len(), 2);
        assert_eq!(conf.lemma_mappings.len(), 1);
        assert_eq!(conf.guessed_lemma_marker, "?");
        assert_eq!(conf.suffix_model_weight, Some(0.75));
    }

    #[test]
    fn empty_config_is_default() {
        let conf = Configuration::from_xml_str("<config/>").unwrap();
        assert!(conf.tag_mappings.is_empty());
        assert!(conf.guessed_lemma_marker.is_empty());
        assert!(conf.suffix_model_weight.is_none());
    }

    #[test]
    fn rejects_mapping_without_target() {
        let xml = r#"<config><tag_mapping pattern="^X$"/></config>"#;
        assert!(Configuration::from_xml_str(xml).is_err());
    }

    #[test]
    fn input_separator_spec_roundtrip() {
        let seps = InputSeparators::parse("#{{#||#}}#[").unwrap();
        assert_eq!(seps.open, "{{");
        assert_eq!(seps.alt, "||");
        assert_eq!(seps.close, "}}");
        assert_eq!(seps.tag_open, "[");

        let default_spec = InputSeparators::parse(" {{ || }} [").unwrap();
        assert_eq!(default_spec.open, InputSeparators::default().open);
    }

    #[test]
    fn input_separator_rejects_short_spec() {
        assert!(InputSeparators::parse("#{{#}}").is_err());
        assert!(InputSeparators::parse("").is_err());
    }
}
