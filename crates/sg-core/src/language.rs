//! Language/Voice Resolver
//!
//! Maps a caller-supplied language alias (and optional voice) to a ranked
//! list of `(backend, native language, native voice)` candidates.
//!
//! Voice name matching lives only here, in the typed [`PreferenceTable`].
//! Backends never guess voices on their own.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;

use crate::capability::{BackendId, CapabilityDescriptor, CapabilitySet, normalize_code, top_level_code};
use crate::error::{Error, JobError, Result};
use crate::job::JobKind;

/// Canonical language bucket
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LanguageFamily {
    Cantonese,
    MandarinSimplified,
    MandarinTraditional,
    /// Chinese without a script or region hint
    Chinese,
    English,
    Spanish,
    French,
    German,
    Italian,
    Japanese,
    Korean,
    Portuguese,
    Russian,
    /// Anything else, keyed by its top-level code
    Unlisted(String),
    /// Left to the recognizer (transcription with `auto`)
    Undetermined,
}

/// Caller-facing aliases, already normalized (lower case, `-` separator)
pub const ALIASES: &[(&str, LanguageFamily)] = &[
    ("yue", LanguageFamily::Cantonese),
    ("zh-hk", LanguageFamily::Cantonese),
    ("zh-yue", LanguageFamily::Cantonese),
    ("zh-mo", LanguageFamily::Cantonese),
    ("yue-hk", LanguageFamily::Cantonese),
    ("cantonese", LanguageFamily::Cantonese),
    ("zh-cn", LanguageFamily::MandarinSimplified),
    ("zh-sg", LanguageFamily::MandarinSimplified),
    ("zh-hans", LanguageFamily::MandarinSimplified),
    ("cmn", LanguageFamily::MandarinSimplified),
    ("mandarin", LanguageFamily::MandarinSimplified),
    ("zh-tw", LanguageFamily::MandarinTraditional),
    ("zh-hant", LanguageFamily::MandarinTraditional),
    ("zh", LanguageFamily::Chinese),
    ("chinese", LanguageFamily::Chinese),
    ("en", LanguageFamily::English),
    ("english", LanguageFamily::English),
    ("es", LanguageFamily::Spanish),
    ("spanish", LanguageFamily::Spanish),
    ("fr", LanguageFamily::French),
    ("french", LanguageFamily::French),
    ("de", LanguageFamily::German),
    ("german", LanguageFamily::German),
    ("it", LanguageFamily::Italian),
    ("italian", LanguageFamily::Italian),
    ("ja", LanguageFamily::Japanese),
    ("japanese", LanguageFamily::Japanese),
    ("ko", LanguageFamily::Korean),
    ("korean", LanguageFamily::Korean),
    ("pt", LanguageFamily::Portuguese),
    ("portuguese", LanguageFamily::Portuguese),
    ("ru", LanguageFamily::Russian),
    ("russian", LanguageFamily::Russian),
];

impl LanguageFamily {
    /// Classify an alias. `auto` and empty strings must be replaced by the
    /// default language before calling this.
    pub fn from_alias(alias: &str) -> Self {
        let normalized = normalize_code(alias);
        if let Some(family) = lookup(&normalized) {
            return family;
        }
        if let Some(family) = without_script(&normalized).and_then(|stripped| {
            stripped.iter().find_map(|candidate| lookup(candidate))
        }) {
            return family;
        }
        let top = top_level_code(&normalized);
        lookup(&top).unwrap_or(Self::Unlisted(top))
    }

    /// Native codes that identify this family across backends
    pub fn native_codes(&self) -> &'static [&'static str] {
        match self {
            Self::Cantonese => &["zh-HK", "yue"],
            Self::MandarinSimplified => &["zh-CN", "cmn", "zh"],
            Self::MandarinTraditional => &["zh-TW", "cmn", "zh"],
            Self::Chinese => &["zh-CN", "zh", "cmn", "zh-TW", "zh-HK", "yue"],
            Self::English => &["en-US", "en", "en-GB"],
            Self::Spanish => &["es-ES", "es", "es-MX"],
            Self::French => &["fr-FR", "fr"],
            Self::German => &["de-DE", "de"],
            Self::Italian => &["it-IT", "it"],
            Self::Japanese => &["ja-JP", "ja"],
            Self::Korean => &["ko-KR", "ko"],
            Self::Portuguese => &["pt-BR", "pt", "pt-PT"],
            Self::Russian => &["ru-RU", "ru"],
            Self::Unlisted(_) | Self::Undetermined => &[],
        }
    }

    pub fn is_chinese(&self) -> bool {
        matches!(
            self,
            Self::Cantonese | Self::MandarinSimplified | Self::MandarinTraditional | Self::Chinese
        )
    }
}

impl std::fmt::Display for LanguageFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Cantonese => "cantonese",
            Self::MandarinSimplified => "mandarin-simplified",
            Self::MandarinTraditional => "mandarin-traditional",
            Self::Chinese => "chinese",
            Self::English => "english",
            Self::Spanish => "spanish",
            Self::French => "french",
            Self::German => "german",
            Self::Italian => "italian",
            Self::Japanese => "japanese",
            Self::Korean => "korean",
            Self::Portuguese => "portuguese",
            Self::Russian => "russian",
            Self::Undetermined => "auto",
            Self::Unlisted(code) => return write!(f, "unlisted({})", code),
        };
        f.write_str(name)
    }
}

impl Serialize for LanguageFamily {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// `zh-hant-hk` -> [`zh-hk`, `zh-hant`]; `None` without a script subtag
fn without_script(normalized: &str) -> Option<[String; 2]> {
    let parts: Vec<&str> = normalized.split('-').collect();
    match parts.as_slice() {
        [lang, script, region, ..]
            if script.len() == 4 && script.chars().all(|c| c.is_ascii_alphabetic()) =>
        {
            Some([format!("{}-{}", lang, region), format!("{}-{}", lang, script)])
        }
        _ => None,
    }
}

fn lookup(normalized: &str) -> Option<LanguageFamily> {
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == normalized)
        .map(|(_, family)| family.clone())
}

/// One row of the preference table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreferenceEntry {
    pub backend: BackendId,
    pub native_code: String,
    /// Substrings tried in order against voice ids and names
    pub voice_patterns: Vec<String>,
}

impl PreferenceEntry {
    pub fn new(backend: &str, native_code: &str, voice_patterns: &[&str]) -> Self {
        Self {
            backend: BackendId::new(backend),
            native_code: native_code.to_string(),
            voice_patterns: voice_patterns.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Parse `backend:code` or `backend:code:pattern|pattern`
    pub fn parse(spec: &str) -> Result<Self> {
        let mut parts = spec.splitn(3, ':');
        let backend = parts.next().unwrap_or_default().trim();
        let code = parts.next().unwrap_or_default().trim();
        if backend.is_empty() || code.is_empty() {
            return Err(Error::Config(format!(
                "Invalid preference entry '{}', expected backend:code[:voice|voice]",
                spec
            )));
        }
        let patterns: Vec<&str> = parts
            .next()
            .map(|p| p.split('|').map(str::trim).filter(|p| !p.is_empty()).collect())
            .unwrap_or_default();
        Ok(Self::new(backend, code, &patterns))
    }
}

type BuiltinRow = (&'static str, &'static str, &'static [&'static str]);

// Chinese families put online backends first; everything else lists
// cloud, then local voices, then espeak.
const BUILTIN_PREFERENCES: &[(&str, &[BuiltinRow])] = &[
    (
        "cantonese",
        &[
            ("azure", "zh-HK", &["HiuMaan", "WanLung", "HiuGaai"]),
            ("gtts", "yue", &[]),
            ("say", "zh_HK", &["Sinji"]),
            ("espeak", "yue", &[]),
        ],
    ),
    (
        "zh-cn",
        &[
            ("azure", "zh-CN", &["Xiaoxiao", "Yunxi"]),
            ("gtts", "zh-CN", &[]),
            ("say", "zh_CN", &["Tingting"]),
            ("espeak", "cmn", &[]),
        ],
    ),
    (
        "zh-tw",
        &[
            ("azure", "zh-TW", &["HsiaoChen"]),
            ("gtts", "zh-TW", &[]),
            ("say", "zh_TW", &["Meijia"]),
            ("espeak", "cmn", &[]),
        ],
    ),
    (
        "zh",
        &[
            ("azure", "zh-CN", &["Xiaoxiao"]),
            ("gtts", "zh-CN", &[]),
            ("openai", "zh", &[]),
            ("say", "zh_CN", &["Tingting", "Sinji", "Meijia"]),
            ("espeak", "cmn", &[]),
        ],
    ),
    (
        "en",
        &[
            ("azure", "en-US", &["JennyNeural"]),
            ("openai", "en", &["alloy"]),
            ("gtts", "en", &[]),
            ("say", "en_US", &["Samantha", "Alex"]),
            ("espeak", "en", &[]),
        ],
    ),
    (
        "es",
        &[
            ("azure", "es-ES", &["ElviraNeural"]),
            ("openai", "es", &["alloy"]),
            ("gtts", "es", &[]),
            ("say", "es_ES", &["Monica"]),
            ("espeak", "es", &[]),
        ],
    ),
    (
        "fr",
        &[
            ("azure", "fr-FR", &["DeniseNeural"]),
            ("openai", "fr", &["alloy"]),
            ("gtts", "fr", &[]),
            ("say", "fr_FR", &["Thomas", "Amelie"]),
            ("espeak", "fr", &[]),
        ],
    ),
    (
        "de",
        &[
            ("azure", "de-DE", &["KatjaNeural"]),
            ("openai", "de", &["alloy"]),
            ("gtts", "de", &[]),
            ("say", "de_DE", &["Anna"]),
            ("espeak", "de", &[]),
        ],
    ),
    (
        "it",
        &[
            ("azure", "it-IT", &["ElsaNeural"]),
            ("openai", "it", &["alloy"]),
            ("gtts", "it", &[]),
            ("say", "it_IT", &["Alice"]),
            ("espeak", "it", &[]),
        ],
    ),
    (
        "ja",
        &[
            ("azure", "ja-JP", &["NanamiNeural"]),
            ("openai", "ja", &["alloy"]),
            ("gtts", "ja", &[]),
            ("say", "ja_JP", &["Kyoko"]),
            ("espeak", "ja", &[]),
        ],
    ),
    (
        "ko",
        &[
            ("azure", "ko-KR", &["SunHiNeural"]),
            ("openai", "ko", &["alloy"]),
            ("gtts", "ko", &[]),
            ("say", "ko_KR", &["Yuna"]),
            ("espeak", "ko", &[]),
        ],
    ),
    (
        "pt",
        &[
            ("azure", "pt-BR", &["FranciscaNeural"]),
            ("openai", "pt", &["alloy"]),
            ("gtts", "pt", &[]),
            ("say", "pt_BR", &["Luciana"]),
            ("espeak", "pt", &[]),
        ],
    ),
    (
        "ru",
        &[
            ("azure", "ru-RU", &["SvetlanaNeural"]),
            ("openai", "ru", &["alloy"]),
            ("gtts", "ru", &[]),
            ("say", "ru_RU", &["Milena"]),
            ("espeak", "ru", &[]),
        ],
    ),
];

/// Per-family ordered list of preferred (backend, native code, voice) rows
#[derive(Debug, Clone, Default)]
pub struct PreferenceTable {
    entries: HashMap<LanguageFamily, Vec<PreferenceEntry>>,
}

impl PreferenceTable {
    /// Built-in table
    pub fn builtin() -> Self {
        let entries = BUILTIN_PREFERENCES
            .iter()
            .map(|(alias, rows)| {
                let rows = rows
                    .iter()
                    .map(|(backend, code, voices)| PreferenceEntry::new(backend, code, voices))
                    .collect();
                (LanguageFamily::from_alias(alias), rows)
            })
            .collect();
        Self { entries }
    }

    /// Replace whole families from config (`alias -> ["backend:code:voice", ...]`)
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, Vec<String>>) -> Result<Self> {
        for (alias, specs) in overrides {
            let family = LanguageFamily::from_alias(alias);
            if let LanguageFamily::Unlisted(code) = &family {
                return Err(Error::Config(format!(
                    "Unknown language family in [preferences]: {}",
                    code
                )));
            }
            let rows = specs
                .iter()
                .map(|spec| PreferenceEntry::parse(spec))
                .collect::<Result<Vec<_>>>()?;
            self.entries.insert(family, rows);
        }
        Ok(self)
    }

    pub fn entries(&self, family: &LanguageFamily) -> &[PreferenceEntry] {
        self.entries.get(family).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn families(&self) -> impl Iterator<Item = &LanguageFamily> {
        self.entries.keys()
    }
}

/// One ranked way of serving a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedCandidate {
    pub backend: BackendId,
    pub native_language: String,
    pub voice: Option<String>,
    /// Lower is preferred
    pub rank: usize,
}

/// Language/voice resolver over one capability snapshot
#[derive(Debug, Clone)]
pub struct Resolver {
    capabilities: Arc<CapabilitySet>,
    table: PreferenceTable,
    default_language: String,
}

impl Resolver {
    pub fn new(
        capabilities: Arc<CapabilitySet>,
        table: PreferenceTable,
        default_language: impl Into<String>,
    ) -> Self {
        Self {
            capabilities,
            table,
            default_language: default_language.into(),
        }
    }

    pub fn capabilities(&self) -> &Arc<CapabilitySet> {
        &self.capabilities
    }

    /// Replace `auto`/empty with the default language
    pub fn effective_alias<'a>(&'a self, alias: &'a str) -> &'a str {
        let trimmed = alias.trim();
        if is_auto(trimmed) {
            self.default_language.as_str()
        } else {
            trimmed
        }
    }

    pub fn family(&self, alias: &str) -> LanguageFamily {
        LanguageFamily::from_alias(self.effective_alias(alias))
    }

    /// Like [`family`](Self::family), but `auto` transcription stays
    /// [`LanguageFamily::Undetermined`] so the recognizer detects the language
    pub fn family_for(&self, kind: JobKind, alias: &str) -> LanguageFamily {
        if kind == JobKind::Transcription && is_auto(alias) {
            LanguageFamily::Undetermined
        } else {
            self.family(alias)
        }
    }

    /// Synthesis candidates for an alias
    pub fn resolve(&self, alias: &str, explicit_voice: Option<&str>) -> Vec<ResolvedCandidate> {
        self.resolve_for(JobKind::Synthesis, alias, explicit_voice)
    }

    pub fn resolve_for(
        &self,
        kind: JobKind,
        alias: &str,
        explicit_voice: Option<&str>,
    ) -> Vec<ResolvedCandidate> {
        let family = self.family_for(kind, alias);
        let candidates = self.family_candidates(kind, &family, self.effective_alias(alias));
        match explicit_voice.map(str::trim).filter(|v| !v.is_empty()) {
            Some(voice) => self.apply_voice(candidates, voice),
            None => candidates,
        }
    }

    /// Like [`resolve_for`](Self::resolve_for) but turns emptiness into a typed error
    pub fn resolve_checked(
        &self,
        kind: JobKind,
        alias: &str,
        explicit_voice: Option<&str>,
    ) -> std::result::Result<(LanguageFamily, Vec<ResolvedCandidate>), JobError> {
        let family = self.family_for(kind, alias);
        let effective = match family {
            LanguageFamily::Undetermined => "auto",
            _ => self.effective_alias(alias),
        };
        let candidates = self.family_candidates(kind, &family, effective);
        if candidates.is_empty() {
            return Err(JobError::UnsupportedLanguage(effective.to_string()));
        }

        let Some(voice) = explicit_voice.map(str::trim).filter(|v| !v.is_empty()) else {
            return Ok((family, candidates));
        };
        let matched = self.apply_voice(candidates, voice);
        if matched.is_empty() {
            return Err(JobError::NoMatchingVoice {
                voice: voice.to_string(),
                language: effective.to_string(),
            });
        }
        Ok((family, matched))
    }

    fn family_candidates(
        &self,
        kind: JobKind,
        family: &LanguageFamily,
        alias: &str,
    ) -> Vec<ResolvedCandidate> {
        let mut candidates = Vec::new();
        let mut seen: HashSet<BackendId> = HashSet::new();
        let mut push = |descriptor: &CapabilityDescriptor, code: &str, voice: Option<String>| {
            if seen.insert(descriptor.id.clone()) {
                candidates.push(ResolvedCandidate {
                    backend: descriptor.id.clone(),
                    native_language: code.to_string(),
                    voice: if kind == JobKind::Synthesis { voice } else { None },
                    rank: 0,
                });
            }
        };

        if *family == LanguageFamily::Undetermined {
            // no language hint; every backend that can do the job
            for descriptor in self.capabilities.iter().filter(|d| d.supports(kind)) {
                push(descriptor, "", None);
            }
        } else if let LanguageFamily::Unlisted(top) = family {
            for descriptor in self.capabilities.iter().filter(|d| d.supports(kind)) {
                if descriptor.languages.iter().any(|l| top_level_code(l) == *top) {
                    push(descriptor, alias, None);
                }
            }
        } else {
            for entry in self.table.entries(family) {
                let Some(descriptor) = self.capabilities.get(&entry.backend) else {
                    continue;
                };
                if !descriptor.supports(kind) {
                    continue;
                }
                let Some(code) = descriptor.native_code(&entry.native_code) else {
                    continue;
                };
                let voice = pick_voice(descriptor, code, &entry.voice_patterns);
                push(descriptor, code, voice);
            }

            // Backends without a table row that still speak the family
            for descriptor in self.capabilities.iter().filter(|d| d.supports(kind)) {
                let code = family
                    .native_codes()
                    .iter()
                    .find_map(|c| descriptor.native_code(c));
                if let Some(code) = code {
                    let voice = descriptor.preferred_voice(code).map(str::to_string);
                    push(descriptor, code, voice);
                }
            }
        }

        rerank(candidates)
    }

    fn apply_voice(&self, candidates: Vec<ResolvedCandidate>, requested: &str) -> Vec<ResolvedCandidate> {
        let requested = requested.to_lowercase();
        let mut matched: Vec<(u8, usize, ResolvedCandidate)> = candidates
            .into_iter()
            .filter_map(|mut candidate| {
                let descriptor = self.capabilities.get(&candidate.backend)?;
                let (exactness, voice) = descriptor
                    .voices
                    .iter()
                    .filter_map(|v| voice_exactness(&v.id, &v.name, &requested).map(|e| (e, v)))
                    .min_by_key(|(e, _)| *e)?;
                candidate.voice = Some(voice.id.clone());
                let order = self.capabilities.order(&candidate.backend).unwrap_or(usize::MAX);
                Some((exactness, order, candidate))
            })
            .collect();

        matched.sort_by_key(|(exactness, order, _)| (*exactness, *order));
        rerank(matched.into_iter().map(|(_, _, c)| c).collect())
    }
}

fn is_auto(alias: &str) -> bool {
    let trimmed = alias.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case("auto")
}

fn pick_voice(descriptor: &CapabilityDescriptor, code: &str, patterns: &[String]) -> Option<String> {
    patterns
        .iter()
        .find_map(|pattern| descriptor.voices.iter().find(|v| v.matches_pattern(pattern)))
        .map(|v| v.id.clone())
        .or_else(|| descriptor.preferred_voice(code).map(str::to_string))
}

/// 0 = exact, 1 = prefix, 2 = substring
fn voice_exactness(id: &str, name: &str, requested: &str) -> Option<u8> {
    [id, name]
        .iter()
        .filter_map(|field| {
            let field = field.to_lowercase();
            if field == requested {
                Some(0)
            } else if field.starts_with(requested) {
                Some(1)
            } else if field.contains(requested) {
                Some(2)
            } else {
                None
            }
        })
        .min()
}

fn rerank(mut candidates: Vec<ResolvedCandidate>) -> Vec<ResolvedCandidate> {
    for (rank, candidate) in candidates.iter_mut().enumerate() {
        candidate.rank = rank;
    }
    candidates
}
