use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{GatewayError, Result};

pub const DEFAULT_AUDIO_FORMAT: &str = "wav";

// How the remote scorer should judge the recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradingMode {
    Scripted,
    Unscripted,
    Pronunciation,
}

impl GradingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GradingMode::Scripted => "scripted",
            GradingMode::Unscripted => "unscripted",
            GradingMode::Pronunciation => "pronunciation",
        }
    }

    // scripted and pronunciation grade against a fixed phrase
    pub fn requires_expected_text(&self) -> bool {
        !matches!(self, GradingMode::Unscripted)
    }
}

impl fmt::Display for GradingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pronunciation variant, sent as the last path segment of the scoring URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Accent(String);

impl Accent {
    pub fn parse(raw: &str) -> Result<Self> {
        let code = raw.trim().to_ascii_lowercase();
        if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(GatewayError::InvalidRequest(format!(
                "accent must be a short alphanumeric code, got {raw:?}"
            )));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Accent {
    fn default() -> Self {
        Self("us".to_string())
    }
}

impl TryFrom<String> for Accent {
    type Error = GatewayError;

    fn try_from(value: String) -> Result<Self> {
        Accent::parse(&value)
    }
}

impl From<Accent> for String {
    fn from(accent: Accent) -> Self {
        accent.0
    }
}

impl fmt::Display for Accent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Open-ended question context for unscripted grading.
// Field order here is the order the scorer (and the cache key) sees.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradingContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_answer_description: Option<String>,
}

impl GradingContext {
    /// Drops empty sub-fields; `None` when nothing is left.
    pub fn new(
        question: Option<&str>,
        context_description: Option<&str>,
        valid_answer_description: Option<&str>,
    ) -> Option<Self> {
        let keep = |s: Option<&str>| s.filter(|s| !s.is_empty()).map(str::to_string);
        let context = Self {
            question: keep(question),
            context_description: keep(context_description),
            valid_answer_description: keep(valid_answer_description),
        };
        (!context.is_empty()).then_some(context)
    }

    pub fn is_empty(&self) -> bool {
        self.question.is_none()
            && self.context_description.is_none()
            && self.valid_answer_description.is_none()
    }

    pub fn normalized(&self) -> Option<Self> {
        Self::new(
            self.question.as_deref(),
            self.context_description.as_deref(),
            self.valid_answer_description.as_deref(),
        )
    }
}

// Body posted to the remote scorer; also the input of the cache key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradingRequest {
    pub audio_format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_text: Option<String>,
    pub audio_base64: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<GradingContext>,
}

impl GradingRequest {
    pub fn scripted(expected_text: impl Into<String>, audio_base64: impl Into<String>) -> Self {
        Self {
            audio_format: DEFAULT_AUDIO_FORMAT.to_string(),
            expected_text: Some(expected_text.into()),
            audio_base64: audio_base64.into(),
            context: None,
        }
    }

    pub fn unscripted(context: Option<GradingContext>, audio_base64: impl Into<String>) -> Self {
        Self {
            audio_format: DEFAULT_AUDIO_FORMAT.to_string(),
            expected_text: None,
            audio_base64: audio_base64.into(),
            context,
        }
    }
}

// Who is asking; forwarded to the scorer as headers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub host: String,
    pub user_id: String,
}

impl CallerIdentity {
    pub fn new(host: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user_id: user_id.into(),
        }
    }

    pub fn caller_id(&self) -> String {
        format!("{}-{}", self.host, self.user_id)
    }
}

/// Selects the endpoint and headers of a scoring call. Not part of the cache key.
#[derive(Debug, Clone)]
pub struct ScoringTarget {
    pub mode: GradingMode,
    pub accent: Accent,
    pub caller: CallerIdentity,
}

// Question definition as the grading layer needs it
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Question {
    #[serde(default)]
    pub id: u64,
    pub mode: GradingMode,
    #[serde(default)]
    pub accent: Accent,
    #[serde(default)]
    pub speech_phrase: Option<String>,
    #[serde(default)]
    pub context_question: Option<String>,
    #[serde(default)]
    pub context_description: Option<String>,
    #[serde(default)]
    pub context_valid_answer_description: Option<String>,
}

// ---- HTTP payloads ----

#[derive(Debug, Clone, Deserialize)]
pub struct ScoreRequest {
    pub mode: GradingMode,
    #[serde(default)]
    pub accent: Accent,
    pub audio_base64: String,
    #[serde(default)]
    pub expected_text: Option<String>,
    #[serde(default)]
    pub context: Option<GradingContext>,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreResponse {
    pub cache_key: String,
    pub cached: bool,
    pub result: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GradeRequest {
    pub question: Question,
    pub user_id: String,
    pub recordings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GradedState {
    GradedRight,
    GradedPartial,
    GradedWrong,
}

impl GradedState {
    pub fn for_fraction(fraction: f64) -> Self {
        if fraction >= 0.9999999 {
            GradedState::GradedRight
        } else if fraction <= 0.0000001 {
            GradedState::GradedWrong
        } else {
            GradedState::GradedPartial
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GradeResponse {
    pub fraction: f64,
    pub state: GradedState,
    pub feedback_html: String,
}

// ---- Remote scorer result shapes ----

#[derive(Debug, Clone, Deserialize)]
pub struct BandPrediction {
    pub prediction: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProficiencyScores {
    pub mock_ielts: BandPrediction,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SectionScore {
    pub english_proficiency_scores: ProficiencyScores,
}

impl SectionScore {
    pub fn prediction(&self) -> f64 {
        self.english_proficiency_scores.mock_ielts.prediction
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhonemeScore {
    pub ipa_label: String,
    pub phoneme_score: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WordScore {
    pub word_text: String,
    pub word_score: f64,
    #[serde(default)]
    pub phonemes: Vec<PhonemeScore>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PronunciationSection {
    #[serde(default)]
    pub words: Vec<WordScore>,
    #[serde(default)]
    pub english_proficiency_scores: Option<ProficiencyScores>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FluencyMetrics {
    pub speech_rate: Option<f64>,
    pub number_of_pauses: Option<f64>,
    pub length_of_run: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackText {
    pub feedback_text: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FluencyFeedback {
    pub speech_rate: Option<FeedbackText>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FluencySection {
    #[serde(default)]
    pub english_proficiency_scores: Option<ProficiencyScores>,
    #[serde(default)]
    pub metrics: FluencyMetrics,
    #[serde(default)]
    pub feedback: FluencyFeedback,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelevanceSection {
    pub class: String,
}

// scripted and unscripted answers share this shape
#[derive(Debug, Clone, Deserialize)]
pub struct ProficiencyReport {
    pub overall: SectionScore,
    #[serde(default)]
    pub pronunciation: Option<PronunciationSection>,
    #[serde(default)]
    pub fluency: Option<FluencySection>,
    #[serde(default)]
    pub grammar: Option<SectionScore>,
    #[serde(default)]
    pub vocabulary: Option<SectionScore>,
    #[serde(default)]
    pub relevance: Option<RelevanceSection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PronunciationReport {
    pub overall_score: f64,
    #[serde(default)]
    pub pronunciation: Option<PronunciationSection>,
    #[serde(default)]
    pub fluency: Option<FluencySection>,
}

/// Scorer output, validated against the shape its grading mode promises.
#[derive(Debug, Clone)]
pub enum ScoringResult {
    Scripted(ProficiencyReport),
    Unscripted(ProficiencyReport),
    Pronunciation(PronunciationReport),
}

impl ScoringResult {
    pub fn from_value(mode: GradingMode, value: &Value) -> Result<Self> {
        let parsed = match mode {
            GradingMode::Scripted => {
                serde_json::from_value(value.clone()).map(ScoringResult::Scripted)
            }
            GradingMode::Unscripted => {
                serde_json::from_value(value.clone()).map(ScoringResult::Unscripted)
            }
            GradingMode::Pronunciation => {
                serde_json::from_value(value.clone()).map(ScoringResult::Pronunciation)
            }
        };
        parsed.map_err(|e| {
            GatewayError::ScoringUnavailable(format!("unexpected {mode} response shape: {e}"))
        })
    }

    pub fn mode(&self) -> GradingMode {
        match self {
            ScoringResult::Scripted(_) => GradingMode::Scripted,
            ScoringResult::Unscripted(_) => GradingMode::Unscripted,
            ScoringResult::Pronunciation(_) => GradingMode::Pronunciation,
        }
    }

    // 0..=1 contribution of one recording to the question grade
    pub fn fraction(&self) -> f64 {
        match self {
            ScoringResult::Scripted(report) | ScoringResult::Unscripted(report) => {
                report.overall.prediction() / 10.0
            }
            ScoringResult::Pronunciation(report) => report.overall_score / 100.0,
        }
    }

    pub fn pronunciation(&self) -> Option<&PronunciationSection> {
        match self {
            ScoringResult::Scripted(report) | ScoringResult::Unscripted(report) => {
                report.pronunciation.as_ref()
            }
            ScoringResult::Pronunciation(report) => report.pronunciation.as_ref(),
        }
    }

    pub fn fluency(&self) -> Option<&FluencySection> {
        match self {
            ScoringResult::Scripted(report) | ScoringResult::Unscripted(report) => {
                report.fluency.as_ref()
            }
            ScoringResult::Pronunciation(report) => report.fluency.as_ref(),
        }
    }
}
