//! Output formatting for CLI

use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use tunemark_core::{Error, MatchCandidate};
use tunemark_frequency::IdentifyOutcome;

/// One row of the candidate table
#[derive(Tabled)]
pub struct CandidateRow {
    #[tabled(rename = "Rank")]
    pub rank: usize,
    #[tabled(rename = "Song")]
    pub song_id: i64,
    #[tabled(rename = "Title")]
    pub title: String,
    #[tabled(rename = "Channel")]
    pub channel: String,
    #[tabled(rename = "Score")]
    pub score: String,
    #[tabled(rename = "Offset (frames)")]
    pub time_diff: i64,
}

impl CandidateRow {
    pub fn new(rank: usize, candidate: &MatchCandidate) -> Self {
        Self {
            rank,
            song_id: candidate.song_id.0,
            title: candidate.title.clone(),
            channel: candidate.channel.clone().unwrap_or_else(|| "-".into()),
            score: format!("{:.0}", candidate.score),
            time_diff: candidate.time_diff,
        }
    }
}

pub fn candidate_table(candidates: &[MatchCandidate]) -> String {
    let rows = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| CandidateRow::new(i + 1, c));
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Human-readable rendering of an identification result
pub fn describe_outcome(outcome: &IdentifyOutcome) -> String {
    match outcome {
        IdentifyOutcome::NoFingerprints => {
            "No fingerprints: the recording is too quiet or too short".to_string()
        }
        IdentifyOutcome::NoMatch => "No match found".to_string(),
        IdentifyOutcome::LowConfidence { best } => format!(
            "Low confidence: best guess \"{}\" scored {:.0}\n{}",
            best.title,
            best.score,
            candidate_table(std::slice::from_ref(best))
        ),
        IdentifyOutcome::Matched { candidates } => {
            format!("Matched:\n{}", candidate_table(candidates))
        }
    }
}

pub fn to_json<T: Serialize>(data: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(data)?)
}

/// One-line failure report, tagged with the library error code when there is one
pub fn error_line(err: &anyhow::Error) -> String {
    let code = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<Error>())
        .map(Error::error_code);
    match code {
        Some(code) => format!("error[{}]: {:#}", code, err),
        None => format!("error: {:#}", err),
    }
}
