//! Translation prompt and style guide selection.

use std::path::Path;

use transync_core::config::LlmConfig;
use transync_core::DocPath;

/// Style guide text: a base guide plus path-prefix overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleGuide {
    base: Option<String>,
    overrides: Vec<(String, String)>,
}

impl StyleGuide {
    pub fn new(base: Option<String>, overrides: Vec<(String, String)>) -> Self {
        Self { base, overrides }
    }

    /// Read the guide files named in `config`, relative to `root`.
    ///
    /// Unreadable files are skipped with a warning; a missing guide only
    /// weakens the prompt.
    pub fn load(root: &Path, config: &LlmConfig) -> Self {
        let read = |p: &Path| {
            let path = if p.is_absolute() {
                p.to_path_buf()
            } else {
                root.join(p)
            };
            match std::fs::read_to_string(&path) {
                Ok(s) => Some(s),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "style guide not loaded");
                    None
                }
            }
        };
        let base = config.style_guide.as_deref().and_then(read);
        let overrides = config
            .style_guide_overrides
            .iter()
            .filter_map(|o| read(&o.file).map(|text| (o.path_prefix.clone(), text)))
            .collect();
        Self { base, overrides }
    }

    /// Longest matching prefix override for `document`.
    pub fn override_for(&self, document: &DocPath) -> Option<&str> {
        self.overrides
            .iter()
            .filter(|(prefix, _)| document.as_str().starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, text)| text.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.base.is_none() && self.overrides.is_empty()
    }

    fn section(&self, document: &DocPath) -> String {
        let custom = self.override_for(document);
        if self.base.is_none() && custom.is_none() {
            return String::new();
        }
        let mut out = String::from("Follow this style guide when translating:\n\n");
        if let Some(base) = &self.base {
            out.push_str("## Base style guide\n\n");
            out.push_str(base.trim_end());
            out.push_str("\n\n");
        }
        if let Some(custom) = custom {
            out.push_str(&format!("## Style guide for {document}\n\n"));
            out.push_str(custom.trim_end());
            out.push_str("\n\nWhere the two guides disagree, the guide for this document wins.\n\n");
        }
        out.push_str("---\n\n");
        out
    }
}

/// Prompt asking for a translation of `text` into `language`.
pub fn translation_prompt(text: &str, document: &DocPath, language: &str, guide: &StyleGuide) -> String {
    format!(
        "{guide}Translate the following documentation text into {language}.\n\
         \n\
         Rules:\n\
         1. Keep the Markdown / AsciiDoc / HTML markup unchanged.\n\
         2. Do not translate code, URLs, file paths or commands.\n\
         3. Keep technical terms in English where no established {language} term exists.\n\
         4. Keep exactly the same number of lines and line breaks as the source.\n\
         5. Leave text that is already in {language} unchanged.\n\
         6. Reply with the translation only.\n\
         \n\
         Text:\n\
         \n\
         {text}\n",
        guide = guide.section(document),
    )
}
