pub const DEFAULT_CATEGORY: &str = "Snacks";
pub const DEFAULT_AISLE: &str = "Other";
pub const DEFAULT_EXERCISE_CATEGORY: &str = "Other";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub category: &'static str,
    pub aisle: &'static str,
}

// USDA food group names, matched case-insensitively as whole strings.
const FOOD_GROUPS: &[(&str, &str)] = &[
    ("dairy and egg products", "Dairy"),
    ("spices and herbs", "Spices & Herbs"),
    ("baby foods", "Baby Food"),
    ("fats and oils", "Fats & Oils"),
    ("poultry products", "Poultry"),
    ("soups, sauces, and gravies", "Condiments"),
    ("sausages and luncheon meats", "Meat"),
    ("breakfast cereals", "Grains"),
    ("fruits and fruit juices", "Fruits"),
    ("pork products", "Meat"),
    ("vegetables and vegetable products", "Vegetables"),
    ("nut and seed products", "Nuts & Seeds"),
    ("beef products", "Meat"),
    ("beverages", "Beverages"),
    ("finfish and shellfish products", "Seafood"),
    ("legumes and legume products", "Legumes"),
    ("lamb, veal, and game products", "Meat"),
    ("baked products", "Baked Goods"),
    ("sweets", "Sweets"),
    ("cereal grains and pasta", "Grains"),
    ("fast foods", "Prepared Meals"),
    ("meals, entrees, and side dishes", "Prepared Meals"),
    ("restaurant foods", "Prepared Meals"),
    ("american indian/alaska native foods", "Prepared Meals"),
    ("snacks", "Snacks"),
];

// Fallback for free-form branded and WWEIA category names. First hit wins.
const CATEGORY_KEYWORDS: &[(&str, &str)] = &[
    ("baby", "Baby Food"),
    ("pizza", "Prepared Meals"),
    ("sandwich", "Prepared Meals"),
    ("entree", "Prepared Meals"),
    ("candy", "Sweets"),
    ("chocolate", "Sweets"),
    ("yogurt", "Dairy"),
    ("cheese", "Dairy"),
    ("milk", "Dairy"),
    ("eggs", "Dairy"),
    ("chicken", "Poultry"),
    ("turkey", "Poultry"),
    ("poultry", "Poultry"),
    ("beef", "Meat"),
    ("pork", "Meat"),
    ("sausage", "Meat"),
    ("meat", "Meat"),
    ("fish", "Seafood"),
    ("seafood", "Seafood"),
    ("vegetable", "Vegetables"),
    ("fruit", "Fruits"),
    ("bread", "Baked Goods"),
    ("cookie", "Baked Goods"),
    ("cake", "Baked Goods"),
    ("cereal", "Grains"),
    ("pasta", "Grains"),
    ("rice", "Grains"),
    ("bean", "Legumes"),
    ("nuts", "Nuts & Seeds"),
    ("seeds", "Nuts & Seeds"),
    ("oil", "Fats & Oils"),
    ("sauce", "Condiments"),
    ("dressing", "Condiments"),
    ("spice", "Spices & Herbs"),
    ("juice", "Beverages"),
    ("coffee", "Beverages"),
    ("soda", "Beverages"),
    ("drink", "Beverages"),
    ("chips", "Snacks"),
];

const CATEGORY_AISLES: &[(&str, &str)] = &[
    ("Dairy", "Dairy & Eggs"),
    ("Meat", "Meat & Seafood"),
    ("Poultry", "Meat & Seafood"),
    ("Seafood", "Meat & Seafood"),
    ("Vegetables", "Produce"),
    ("Fruits", "Produce"),
    ("Grains", "Pasta, Rice & Cereal"),
    ("Legumes", "Canned & Dry Goods"),
    ("Nuts & Seeds", "Baking & Nuts"),
    ("Fats & Oils", "Oils & Condiments"),
    ("Condiments", "Oils & Condiments"),
    ("Spices & Herbs", "Spices"),
    ("Beverages", "Beverages"),
    ("Sweets", "Snacks & Sweets"),
    ("Snacks", "Snacks & Sweets"),
    ("Baked Goods", "Bakery"),
    ("Prepared Meals", "Frozen & Prepared"),
    ("Baby Food", "Baby"),
];

const EXERCISE_HEADINGS: &[(&str, &str)] = &[
    ("bicycling", "Cycling"),
    ("conditioning", "Conditioning"),
    ("dancing", "Dance"),
    ("fishing", "Outdoor"),
    ("hunting", "Outdoor"),
    ("home activities", "Household"),
    ("home repair", "Household"),
    ("lawn", "Household"),
    ("inactivity", "Inactivity"),
    ("music", "Music"),
    ("occupation", "Occupational"),
    ("running", "Running"),
    ("self care", "Self Care"),
    ("sports", "Sports"),
    ("transportation", "Transportation"),
    ("walking", "Walking"),
    ("water", "Water Activities"),
    ("winter", "Winter Activities"),
    ("religious", "Religious"),
    ("volunteer", "Volunteer"),
];

pub fn classify_food(source_category: Option<&str>) -> Classification {
    let default = Classification {
        category: DEFAULT_CATEGORY,
        aisle: DEFAULT_AISLE,
    };
    let Some(raw) = source_category else {
        return default;
    };
    let needle = raw.trim().to_lowercase();
    if needle.is_empty() {
        return default;
    }

    let category = FOOD_GROUPS
        .iter()
        .find(|(group, _)| *group == needle)
        .or_else(|| {
            CATEGORY_KEYWORDS
                .iter()
                .find(|(keyword, _)| needle.contains(keyword))
        })
        .map(|(_, category)| *category);

    match category {
        Some(category) => Classification {
            category,
            aisle: aisle_for(category),
        },
        None => default,
    }
}

pub fn aisle_for(category: &str) -> &'static str {
    CATEGORY_AISLES
        .iter()
        .find(|(candidate, _)| *candidate == category)
        .map(|(_, aisle)| *aisle)
        .unwrap_or(DEFAULT_AISLE)
}

pub fn classify_exercise(activity: &str) -> &'static str {
    let needle = activity.trim().to_lowercase();
    EXERCISE_HEADINGS
        .iter()
        .find(|(heading, _)| needle.contains(heading))
        .map(|(_, category)| *category)
        .unwrap_or(DEFAULT_EXERCISE_CATEGORY)
}
