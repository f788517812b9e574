use serde_json::Value;

use super::sources::NutrientScheme;

const KJ_PER_KCAL: f64 = 4.184;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum NutrientField {
    Calories,
    EnergyKj,
    Protein,
    Carbs,
    Fat,
    Fiber,
    Sugar,
    Sodium,
    Cholesterol,
    SaturatedFat,
    MonounsaturatedFat,
    PolyunsaturatedFat,
    TransFat,
}

#[derive(Copy, Clone, Debug)]
enum IdLocation {
    Nested(&'static str),
    Flat(&'static str),
}

// The two schemes reuse small integers with different meanings, so a table is
// always picked by source and never merged with the other.
#[derive(Debug)]
pub struct NutrientTable {
    id_locations: &'static [IdLocation],
    fields: &'static [(u32, NutrientField)],
}

static FDC_TABLE: NutrientTable = NutrientTable {
    id_locations: &[
        IdLocation::Nested("id"),
        IdLocation::Flat("nutrientId"),
        IdLocation::Nested("number"),
    ],
    fields: &[
        (1008, NutrientField::Calories),
        (1062, NutrientField::EnergyKj),
        (1003, NutrientField::Protein),
        (1005, NutrientField::Carbs),
        (1004, NutrientField::Fat),
        (1079, NutrientField::Fiber),
        (2000, NutrientField::Sugar),
        (1093, NutrientField::Sodium),
        (1253, NutrientField::Cholesterol),
        (1258, NutrientField::SaturatedFat),
        (1292, NutrientField::MonounsaturatedFat),
        (1293, NutrientField::PolyunsaturatedFat),
        (1257, NutrientField::TransFat),
    ],
};

static SR_NUMBER_TABLE: NutrientTable = NutrientTable {
    id_locations: &[
        IdLocation::Nested("number"),
        IdLocation::Flat("nutrientNumber"),
    ],
    fields: &[
        (208, NutrientField::Calories),
        (268, NutrientField::EnergyKj),
        (203, NutrientField::Protein),
        (205, NutrientField::Carbs),
        (204, NutrientField::Fat),
        (291, NutrientField::Fiber),
        (269, NutrientField::Sugar),
        (307, NutrientField::Sodium),
        (601, NutrientField::Cholesterol),
        (606, NutrientField::SaturatedFat),
        (645, NutrientField::MonounsaturatedFat),
        (646, NutrientField::PolyunsaturatedFat),
        (605, NutrientField::TransFat),
    ],
};

impl NutrientTable {
    pub fn for_scheme(scheme: NutrientScheme) -> &'static NutrientTable {
        match scheme {
            NutrientScheme::Fdc => &FDC_TABLE,
            NutrientScheme::SrNumber => &SR_NUMBER_TABLE,
        }
    }

    pub fn field_for(&self, id: u32) -> Option<NutrientField> {
        self.fields
            .iter()
            .find(|(candidate, _)| *candidate == id)
            .map(|(_, field)| *field)
    }

    fn resolve_id(&self, entry: &Value) -> Option<u32> {
        self.id_locations.iter().find_map(|location| {
            let raw = match location {
                IdLocation::Nested(key) => entry.get("nutrient").and_then(|n| n.get(*key)),
                IdLocation::Flat(key) => entry.get(*key),
            }?;
            parse_nutrient_id(raw)
        })
    }
}

fn parse_nutrient_id(value: &Value) -> Option<u32> {
    match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|v| v.fract() == 0.0 && *v >= 0.0).map(|v| v as u64))
            .and_then(|id| u32::try_from(id).ok()),
        Value::String(text) => {
            let text = text.trim();
            text.parse::<u32>().ok().or_else(|| {
                text.parse::<f64>()
                    .ok()
                    .filter(|v| v.fract() == 0.0 && *v >= 0.0 && *v <= f64::from(u32::MAX))
                    .map(|v| v as u32)
            })
        }
        _ => None,
    }
}

pub fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NutritionFacts {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub fiber: f64,
    pub sugar: f64,
    pub sodium: f64,
    pub cholesterol: f64,
    pub saturated_fat: f64,
    pub monounsaturated_fat: f64,
    pub polyunsaturated_fat: f64,
    pub trans_fat: f64,
}

impl NutritionFacts {
    fn set(&mut self, field: NutrientField, amount: f64) {
        let slot = match field {
            NutrientField::Calories => &mut self.calories,
            NutrientField::Protein => &mut self.protein,
            NutrientField::Carbs => &mut self.carbs,
            NutrientField::Fat => &mut self.fat,
            NutrientField::Fiber => &mut self.fiber,
            NutrientField::Sugar => &mut self.sugar,
            NutrientField::Sodium => &mut self.sodium,
            NutrientField::Cholesterol => &mut self.cholesterol,
            NutrientField::SaturatedFat => &mut self.saturated_fat,
            NutrientField::MonounsaturatedFat => &mut self.monounsaturated_fat,
            NutrientField::PolyunsaturatedFat => &mut self.polyunsaturated_fat,
            NutrientField::TransFat => &mut self.trans_fat,
            NutrientField::EnergyKj => return,
        };
        *slot = amount;
    }

    pub fn has_macro_content(&self) -> bool {
        self.calories > 0.0 || self.protein > 0.0 || self.carbs > 0.0 || self.fat > 0.0
    }

    pub fn net_carbs(&self) -> f64 {
        (self.carbs - self.fiber).max(0.0)
    }
}

// Single pass; a repeated id overwrites the earlier amount. Energy falls back
// to `round(kJ / 4.184)` only when no positive kcal value was seen.
pub fn extract_nutrition(nutrients: &[Value], table: &NutrientTable) -> NutritionFacts {
    let mut facts = NutritionFacts::default();
    let mut kilojoules: Option<f64> = None;

    for entry in nutrients {
        let Some(field) = table.resolve_id(entry).and_then(|id| table.field_for(id)) else {
            continue;
        };
        let Some(amount) = entry.get("amount").and_then(numeric_value) else {
            continue;
        };
        let amount = amount.max(0.0);

        match field {
            NutrientField::EnergyKj => kilojoules = Some(amount),
            other => facts.set(other, amount),
        }
    }

    if facts.calories <= 0.0 {
        if let Some(kj) = kilojoules {
            facts.calories = (kj / KJ_PER_KCAL).round();
        }
    }

    facts
}
