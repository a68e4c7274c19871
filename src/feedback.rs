//! HTML feedback for graded recordings
//!
//! Words and phonemes are banded by score: 60 and up is green, 30 and up is
//! orange, anything lower is red. Silence phonemes (`SIL`) are not shown and a
//! word with nothing left to show is dropped.

use crate::models::{
    FluencySection, PhonemeScore, ProficiencyReport, ProficiencyScores, PronunciationReport,
    PronunciationSection, ScoringResult,
};

const SILENCE_LABEL: &str = "SIL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    Green,
    Orange,
    Red,
}

impl Band {
    pub fn for_score(score: f64) -> Self {
        if score >= 60.0 {
            Band::Green
        } else if score >= 30.0 {
            Band::Orange
        } else {
            Band::Red
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Band::Green => "green",
            Band::Orange => "orange",
            Band::Red => "red",
        }
    }
}

#[derive(Debug)]
pub struct ScoredWord<'a> {
    pub label: &'a str,
    pub score: f64,
    pub phonemes: Vec<&'a PhonemeScore>,
}

pub fn scored_words(section: &PronunciationSection) -> Vec<ScoredWord<'_>> {
    section
        .words
        .iter()
        .map(|word| ScoredWord {
            label: &word.word_text,
            score: word.word_score,
            phonemes: word
                .phonemes
                .iter()
                .filter(|p| p.ipa_label != SILENCE_LABEL)
                .collect(),
        })
        .filter(|word| !word.phonemes.is_empty())
        .collect()
}

pub fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

// Spoken phrase, weak words underlined in their band colour
pub fn render_phrase(words: &[ScoredWord<'_>]) -> String {
    words
        .iter()
        .map(|word| match Band::for_score(word.score) {
            Band::Green => escape(word.label),
            band => format!(
                "<u class=\"speech-band-{}\">{}</u>",
                band.as_str(),
                escape(word.label)
            ),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn render_word_breakdown(words: &[ScoredWord<'_>]) -> String {
    let mut out = String::from("<div class=\"speech-words\">");
    for word in words {
        out.push_str("<div class=\"speech-word\">");
        out.push_str(&format!(
            "<div class=\"speech-word-label\">{}</div><div class=\"speech-phonemes\">",
            escape(word.label)
        ));
        for phoneme in &word.phonemes {
            out.push_str(&format!(
                "<div class=\"speech-phoneme\"><div class=\"speech-phoneme-label speech-band-{}\">{}</div>\
                 <div class=\"speech-phoneme-score\">{}%</div></div>",
                Band::for_score(phoneme.phoneme_score).as_str(),
                escape(&phoneme.ipa_label),
                phoneme.phoneme_score
            ));
        }
        out.push_str("</div></div>");
    }
    out.push_str("</div>");
    out
}

fn collapsible(id: &str, title: &str, body: &str) -> String {
    format!(
        "<div class=\"speech-section\"><button type=\"button\" class=\"speech-toggle\" \
         aria-controls=\"{id}\" aria-expanded=\"false\">{title}</button>\
         <div id=\"{id}\" class=\"speech-collapse\">{body}</div></div>"
    )
}

fn metric_block(title: &str, value: Option<f64>, feedback: Option<&str>) -> String {
    let value = value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string());
    format!(
        "<div class=\"speech-metric\"><div class=\"speech-metric-header\"><span class=\"speech-metric-title\">{}</span>\
         <span class=\"speech-metric-value\">{}</span></div><div class=\"speech-metric-feedback\">{}</div></div>",
        escape(title),
        escape(&value),
        escape(feedback.unwrap_or(""))
    )
}

pub fn render_fluency(question_id: u64, index: usize, fluency: &FluencySection) -> String {
    let speech_rate_feedback = fluency
        .feedback
        .speech_rate
        .as_ref()
        .map(|f| f.feedback_text.as_str());
    let body = [
        metric_block("Speech Rate", fluency.metrics.speech_rate, speech_rate_feedback),
        metric_block("Number of pauses", fluency.metrics.number_of_pauses, None),
        metric_block("Length of run", fluency.metrics.length_of_run, None),
    ]
    .concat();
    collapsible(
        &format!("speech-fluency-{question_id}-{index}"),
        "Fluency feedback",
        &body,
    )
}

fn render_pronunciation_parts(
    question_id: u64,
    index: usize,
    section: Option<&PronunciationSection>,
) -> (String, String) {
    let words = section.map(scored_words).unwrap_or_default();
    let phrase = format!("<div class=\"speech-phrase\">{}</div>", render_phrase(&words));
    let breakdown = if words.is_empty() {
        String::new()
    } else {
        collapsible(
            &format!("speech-pronunciation-{question_id}-{index}"),
            "Pronunciation feedback",
            &render_word_breakdown(&words),
        )
    };
    (phrase, breakdown)
}

fn section_table(report: &ProficiencyReport) -> String {
    let mut rows = Vec::new();
    let band = |section: &Option<ProficiencyScores>| {
        section.as_ref().map(|s| s.mock_ielts.prediction)
    };
    if let Some(p) = report
        .pronunciation
        .as_ref()
        .and_then(|s| band(&s.english_proficiency_scores))
    {
        rows.push(("pronunciation", p.to_string()));
    }
    if let Some(f) = report
        .fluency
        .as_ref()
        .and_then(|s| band(&s.english_proficiency_scores))
    {
        rows.push(("fluency", f.to_string()));
    }
    if let Some(g) = &report.grammar {
        rows.push(("grammar", g.prediction().to_string()));
    }
    if let Some(v) = &report.vocabulary {
        rows.push(("vocabulary", v.prediction().to_string()));
    }
    if let Some(r) = &report.relevance {
        rows.push(("relevance", r.class.clone()));
    }

    let mut out = String::from("<table class=\"speech-sections\"><tbody>");
    for (name, value) in rows {
        out.push_str(&format!(
            "<tr><th scope=\"row\">{name}</th><td>{}</td></tr>",
            escape(&value)
        ));
    }
    out.push_str("</tbody></table>");
    out
}

fn render_scripted(question_id: u64, index: usize, report: &ProficiencyReport) -> String {
    let (phrase, breakdown) =
        render_pronunciation_parts(question_id, index, report.pronunciation.as_ref());
    let mut out = format!(
        "<div class=\"speech-score\">Average Score IELTS: {}</div>{phrase}{breakdown}",
        report.overall.prediction()
    );
    if let Some(fluency) = &report.fluency {
        out.push_str(&render_fluency(question_id, index, fluency));
    }
    out
}

fn render_unscripted(question_id: u64, index: usize, report: &ProficiencyReport) -> String {
    let (phrase, breakdown) =
        render_pronunciation_parts(question_id, index, report.pronunciation.as_ref());
    let details = collapsible(
        &format!("speech-details-{question_id}-{index}"),
        "Detailed Result",
        &section_table(report),
    );
    let mut out = format!(
        "<div class=\"speech-score\">Overall Score: {}</div>{phrase}{details}{breakdown}",
        report.overall.prediction()
    );
    if let Some(fluency) = &report.fluency {
        out.push_str(&render_fluency(question_id, index, fluency));
    }
    out
}

fn render_pronunciation(question_id: u64, index: usize, report: &PronunciationReport) -> String {
    let (phrase, breakdown) =
        render_pronunciation_parts(question_id, index, report.pronunciation.as_ref());
    let mut out = format!(
        "<div class=\"speech-score\">Overall Score: {}%</div>{phrase}{breakdown}",
        report.overall_score
    );
    if let Some(fluency) = &report.fluency {
        out.push_str(&render_fluency(question_id, index, fluency));
    }
    out
}

/// Feedback fragment for all recordings of one question attempt.
pub fn render_feedback(question_id: u64, results: &[ScoringResult]) -> String {
    let mut out = String::new();
    for (index, result) in results.iter().enumerate() {
        let body = match result {
            ScoringResult::Scripted(report) => render_scripted(question_id, index, report),
            ScoringResult::Unscripted(report) => render_unscripted(question_id, index, report),
            ScoringResult::Pronunciation(report) => {
                render_pronunciation(question_id, index, report)
            }
        };
        out.push_str(&format!(
            "<div class=\"speech-feedback speech-feedback-{}\">{body}</div>",
            result.mode()
        ));
    }
    out
}
