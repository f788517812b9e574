use anyhow::{Context, Result};
use regex::Regex;
use serde_json::Value;

use crate::cli::SourceKind;
use crate::error::IngestError;

use super::classify::{classify_exercise, classify_food};
use super::nutrients::{NutrientTable, NutritionFacts, extract_nutrition, numeric_value};
use super::reader::{
    ACTIVITY_HEADER, CODE_HEADER, DESCRIPTION_HEADER, MET_HEADER, RawExerciseRow, RawFoodRecord,
};

pub const UNKNOWN_FOOD_NAME: &str = "Unknown Food";
pub const DEFAULT_SERVING_SIZE: &str = "100 g";
const MAX_DERIVED_CODE_LEN: usize = 64;

// Coalescing order per canonical field. Earlier entries win.
const NAME_PATHS: &[&[&str]] = &[&["description"], &["foodDescription"]];
const CATEGORY_PATHS: &[&[&str]] = &[
    &["foodCategory", "description"],
    &["foodCategory"],
    &["brandedFoodCategory"],
    &["wweiaFoodCategory", "wweiaFoodCategoryDescription"],
];

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedIngredient {
    pub name: String,
    pub description: String,
    pub serving_size: String,
    pub nutrition: NutritionFacts,
    pub net_carbs: f64,
    pub category: String,
    pub aisle: String,
    pub is_active: bool,
    pub source: SourceKind,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Intensity {
    Light,
    Moderate,
    Vigorous,
}

impl Intensity {
    pub fn from_met(met: f64) -> Self {
        if met < 3.0 {
            Self::Light
        } else if met < 6.0 {
            Self::Moderate
        } else {
            Self::Vigorous
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "LIGHT",
            Self::Moderate => "MODERATE",
            Self::Vigorous => "VIGOROUS",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedExercise {
    pub activity: String,
    pub code: String,
    pub met: f64,
    pub description: String,
    pub category: String,
    pub intensity: Intensity,
    pub is_active: bool,
}

fn coalesce_str<'a>(record: &'a RawFoodRecord, paths: &[&[&str]]) -> Option<&'a str> {
    paths.iter().find_map(|path| {
        let (first, rest) = path.split_first()?;
        let mut value = record.get(*first)?;
        for key in rest {
            value = value.get(*key)?;
        }
        value.as_str().map(str::trim).filter(|text| !text.is_empty())
    })
}

fn serving_size(record: &RawFoodRecord) -> String {
    let labelled = record.get("servingSize").and_then(numeric_value).map(|size| {
        let unit = record
            .get("servingSizeUnit")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|unit| !unit.is_empty())
            .unwrap_or("g");
        format!("{size} {unit}")
    });
    if let Some(labelled) = labelled {
        return labelled;
    }

    record
        .get("foodPortions")
        .and_then(Value::as_array)
        .and_then(|portions| portions.first())
        .and_then(|portion| portion.get("gramWeight"))
        .and_then(numeric_value)
        .filter(|grams| *grams > 0.0)
        .map(|grams| format!("{grams} g"))
        .unwrap_or_else(|| DEFAULT_SERVING_SIZE.to_string())
}

fn required_cell<'a>(
    cell: &'a Option<String>,
    column: &str,
    line: u64,
) -> Result<&'a str, IngestError> {
    cell.as_deref().map(str::trim).ok_or_else(|| {
        IngestError::RecordInvalid(format!("line {line} is missing column {column:?}"))
    })
}

#[derive(Debug, Clone, Copy)]
pub struct FoodNormalizer {
    source: SourceKind,
    table: &'static NutrientTable,
}

impl FoodNormalizer {
    pub fn for_source(source: SourceKind) -> Option<Self> {
        let scheme = source.nutrient_scheme()?;
        Some(Self {
            source,
            table: NutrientTable::for_scheme(scheme),
        })
    }

    pub fn normalize(
        &self,
        record: &RawFoodRecord,
    ) -> Result<NormalizedIngredient, IngestError> {
        let title = coalesce_str(record, NAME_PATHS).unwrap_or(UNKNOWN_FOOD_NAME);

        let nutrients = record
            .get("foodNutrients")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let nutrition = extract_nutrition(nutrients, self.table);
        if !nutrition.has_macro_content() {
            return Err(IngestError::RecordInvalid(format!(
                "{title:?} has no calories, protein, carbs or fat"
            )));
        }

        let classification = classify_food(coalesce_str(record, CATEGORY_PATHS));

        Ok(NormalizedIngredient {
            name: title.to_lowercase(),
            description: title.to_string(),
            serving_size: serving_size(record),
            net_carbs: nutrition.net_carbs(),
            nutrition,
            category: classification.category.to_string(),
            aisle: classification.aisle.to_string(),
            is_active: true,
            source: self.source,
        })
    }
}

pub struct ExerciseNormalizer {
    code_separator: Regex,
}

impl ExerciseNormalizer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            code_separator: Regex::new(r"[^A-Za-z0-9]+")
                .context("failed to compile exercise code regex")?,
        })
    }

    pub fn derive_code(&self, activity: &str) -> String {
        let slug = self.code_separator.replace_all(activity.trim(), "_");
        let mut code = slug.trim_matches('_').to_uppercase();
        code.truncate(MAX_DERIVED_CODE_LEN);
        code.trim_end_matches('_').to_string()
    }

    pub fn normalize(
        &self,
        row: &RawExerciseRow,
    ) -> Result<NormalizedExercise, IngestError> {
        let activity = required_cell(&row.activity, ACTIVITY_HEADER, row.line)?;
        let code = required_cell(&row.code, CODE_HEADER, row.line)?;
        let met_raw = required_cell(&row.met, MET_HEADER, row.line)?;
        let description = required_cell(&row.description, DESCRIPTION_HEADER, row.line)?;

        if activity.is_empty() {
            return Err(IngestError::RecordInvalid(format!(
                "line {} has an empty activity",
                row.line
            )));
        }

        let met = met_raw
            .parse::<f64>()
            .ok()
            .filter(|met| met.is_finite() && *met > 0.0)
            .ok_or_else(|| {
                IngestError::RecordInvalid(format!(
                    "line {} has no usable MET value ({met_raw:?})",
                    row.line
                ))
            })?;

        let code = if code.is_empty() {
            self.derive_code(activity)
        } else {
            code.to_string()
        };
        if code.is_empty() {
            return Err(IngestError::RecordInvalid(format!(
                "line {} has no code and none can be derived from {activity:?}",
                row.line
            )));
        }

        Ok(NormalizedExercise {
            activity: activity.to_string(),
            code,
            met,
            description: description.to_string(),
            category: classify_exercise(activity).to_string(),
            intensity: Intensity::from_met(met),
            is_active: true,
        })
    }
}
