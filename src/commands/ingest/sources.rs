use crate::cli::SourceKind;

pub const KNOWN_CONTAINER_KEYS: [&str; 4] =
    ["FoundationFoods", "SRLegacyFoods", "BrandedFoods", "SurveyFoods"];

pub const SOURCE_ORDER: [SourceKind; 5] = [
    SourceKind::Foundation,
    SourceKind::Survey,
    SourceKind::Legacy,
    SourceKind::Branded,
    SourceKind::Exercises,
];

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SourceFormat {
    Json,
    Csv,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum NutrientScheme {
    Fdc,
    SrNumber,
}

impl SourceKind {
    pub fn default_filename(self) -> &'static str {
        match self {
            Self::Foundation => "foundation_food.json",
            Self::Survey => "survey_food.json",
            Self::Legacy => "sr_legacy_food.json",
            Self::Branded => "branded_food.json",
            Self::Exercises => "met_values.csv",
        }
    }

    pub fn container_key(self) -> Option<&'static str> {
        match self {
            Self::Foundation => Some("FoundationFoods"),
            Self::Survey => Some("SurveyFoods"),
            Self::Legacy => Some("SRLegacyFoods"),
            Self::Branded => Some("BrandedFoods"),
            Self::Exercises => None,
        }
    }

    pub fn format(self) -> SourceFormat {
        match self {
            Self::Exercises => SourceFormat::Csv,
            _ => SourceFormat::Json,
        }
    }

    pub fn nutrient_scheme(self) -> Option<NutrientScheme> {
        match self {
            Self::Foundation | Self::Legacy | Self::Branded => Some(NutrientScheme::Fdc),
            Self::Survey => Some(NutrientScheme::SrNumber),
            Self::Exercises => None,
        }
    }
}
