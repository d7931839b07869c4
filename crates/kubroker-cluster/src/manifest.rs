//! Decoding and encoding of multi-document manifests.
//!
//! A manifest is either a stream of concatenated JSON objects (recognised by
//! a leading `{`) or a multi-document YAML stream separated by `---`.
//! Documents are decoded one at a time; empty documents decode to null and
//! are skipped.

use serde::Deserialize;
use serde_json::Value;
use serde_json::de::StrRead;

use crate::error::{ClusterError, Result};
use crate::resource::ResourceDocument;

/// Streaming iterator over the raw documents of a manifest.
pub enum RawDocuments<'a> {
    Yaml(serde_yaml::Deserializer<'a>),
    Json(serde_json::StreamDeserializer<'a, StrRead<'a>, Value>),
}

impl<'a> RawDocuments<'a> {
    pub fn new(text: &'a str) -> Self {
        if text.trim_start().starts_with('{') {
            Self::Json(serde_json::Deserializer::from_str(text).into_iter())
        } else {
            Self::Yaml(serde_yaml::Deserializer::from_str(text))
        }
    }
}

impl Iterator for RawDocuments<'_> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let next = match self {
                Self::Yaml(de) => de
                    .next()
                    .map(|doc| Value::deserialize(doc).map_err(ClusterError::decode)),
                Self::Json(stream) => stream.next().map(|r| r.map_err(ClusterError::decode)),
            };
            match next {
                Some(Ok(Value::Null)) => continue,
                other => return other,
            }
        }
    }
}

/// Decodes a manifest into resource documents, lazily.
pub fn documents(text: &str) -> impl Iterator<Item = Result<ResourceDocument>> + '_ {
    RawDocuments::new(text).map(|raw| raw.and_then(ResourceDocument::from_value))
}

/// Decodes every non-empty document without validating its shape.
pub fn decode_values(text: &str) -> Result<Vec<Value>> {
    RawDocuments::new(text).collect()
}

/// Emits documents as one multi-document YAML stream.
pub fn encode_yaml(docs: &[Value]) -> Result<String> {
    let mut out = String::new();
    for (i, doc) in docs.iter().enumerate() {
        if i > 0 {
            out.push_str("---\n");
        }
        let text = serde_yaml::to_string(doc).map_err(ClusterError::decode)?;
        out.push_str(&text);
    }
    Ok(out)
}
