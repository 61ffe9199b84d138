//! Exercise and test case models
//!
//! Exercises are authored elsewhere; the grading engine only reads them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::constants::DEFAULT_TEST_CASE_POINTS;

use super::Language;

/// How a raw test case input is turned into positional arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputFormat {
    Json,
    SpaceSeparated,
    LineSeparated,
}

impl InputFormat {
    /// Get input format as string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::SpaceSeparated => "space_separated",
            Self::LineSeparated => "line_separated",
        }
    }

    /// Parse input format from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "json" => Some(Self::Json),
            "space_separated" => Some(Self::SpaceSeparated),
            "line_separated" => Some(Self::LineSeparated),
            _ => None,
        }
    }
}

fn default_points() -> i32 {
    DEFAULT_TEST_CASE_POINTS
}

/// One (input, expected output) pair of an exercise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    pub expected_output: String,
    #[serde(default)]
    pub is_hidden: bool,
    #[serde(default = "default_points")]
    pub points: i32,
    #[serde(default)]
    pub description: Option<String>,
}

impl TestCase {
    /// Points this test case is worth; authoring data below 1 counts as 1
    pub fn weight(&self) -> i32 {
        self.points.max(1)
    }
}

/// Programming exercise definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exercise {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub languages: Vec<Language>,
    pub test_cases: Vec<TestCase>,
    /// Informational only; never used in grading
    pub starter_code: HashMap<Language, String>,
    /// Applies to each test case individually
    pub time_limit_seconds: f64,
    pub function_name: String,
    pub input_format: InputFormat,
}

impl Exercise {
    /// Check whether submissions in `language` are accepted
    pub fn supports(&self, language: Language) -> bool {
        self.languages.contains(&language)
    }

    /// Test cases students can see while practicing
    pub fn visible_test_cases(&self) -> impl Iterator<Item = &TestCase> {
        self.test_cases.iter().filter(|tc| !tc.is_hidden)
    }
}

/// Exercise row as stored by the authoring subsystem
#[derive(Debug, Clone, FromRow)]
pub struct ExerciseRow {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub languages: Vec<String>,
    pub test_cases: sqlx::types::Json<Vec<TestCase>>,
    pub starter_code: Option<sqlx::types::Json<HashMap<String, String>>>,
    pub time_limit_seconds: f64,
    pub function_name: String,
    pub input_format: String,
}

impl TryFrom<ExerciseRow> for Exercise {
    type Error = String;

    fn try_from(row: ExerciseRow) -> Result<Self, Self::Error> {
        let input_format = InputFormat::from_str(&row.input_format)
            .ok_or_else(|| format!("unknown input format '{}'", row.input_format))?;

        // Unknown language tags are ignored rather than poisoning the whole exercise
        let languages = row
            .languages
            .iter()
            .filter_map(|l| Language::from_str(l))
            .collect();

        let starter_code = row
            .starter_code
            .map(|json| {
                json.0
                    .into_iter()
                    .filter_map(|(lang, code)| Language::from_str(&lang).map(|l| (l, code)))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            id: row.id,
            course_id: row.course_id,
            title: row.title,
            languages,
            test_cases: row.test_cases.0,
            starter_code,
            time_limit_seconds: row.time_limit_seconds,
            function_name: row.function_name,
            input_format,
        })
    }
}
