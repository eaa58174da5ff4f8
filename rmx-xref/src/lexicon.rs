//! Constant vocabularies shared by the parser and the derivative resolver
//!
//! Loaded once into immutable sets/maps on first use.

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

/// Physical-form words that may end an ingredient name
pub static PHYSICAL_FORMS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "butter", "oil", "wax", "powder", "extract", "solution", "gel", "liquid", "flakes",
        "flake", "granules", "beads", "crystals", "paste", "resin", "clay", "hydrosol",
        "tincture", "emulsion", "juice", "pellets", "chips", "concentrate", "absolute",
    ]
    .into_iter()
    .collect()
});

/// Keywords that describe a grade or processing variant
pub static VARIATION_KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "refined", "unrefined", "organic", "virgin", "extra virgin", "cold pressed",
        "cold-pressed", "deodorized", "deodorised", "raw", "fractionated", "hydrogenated",
        "bleached", "unbleached", "filtered", "ultra refined", "natural", "pure",
        "crude", "winterized", "expeller pressed", "white", "yellow",
    ]
    .into_iter()
    .collect()
});

/// Single trailing words popped as an inline variation (rule 5)
pub static INLINE_VARIATIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "refined", "unrefined", "organic", "virgin", "deodorized", "deodorised", "raw",
        "fractionated", "hydrogenated", "bleached", "unbleached", "filtered", "crude",
        "winterized",
    ]
    .into_iter()
    .collect()
});

/// Two-word trailing variations, tried before single words
pub static INLINE_VARIATION_PAIRS: &[&str] = &[
    "extra virgin",
    "cold pressed",
    "ultra refined",
    "expeller pressed",
];

/// Words whose presence marks a term as a derivative candidate
pub static MODIFIER_TRIGGERS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "esters", "ester", "betaine", "sulfate", "sulphate", "sulfonate", "crosspolymer",
        "polymer", "oxide", "chloride", "stearate", "glucoside", "glutamate", "isethionate",
        "sarcosinate", "taurate", "amide", "amine", "amidopropyl", "hydroxysultaine",
        "sultaine", "glycerides", "glyceride", "acetate", "citrate",
        "lactylate", "succinate", "phosphate", "quaternium", "amphoacetate", "cocoate",
        "oleate", "laurate", "palmitate", "myristate", "benzoate", "peg", "ppg",
        "hydrolyzed", "hydroxypropyl", "dimethicone", "methicone", "unsaponifiables",
    ]
    .into_iter()
    .collect()
});

/// Known multi-word modifier suffixes, stripped from the tail (longest first)
pub static MODIFIER_SUFFIXES: Lazy<Vec<&'static str>> = Lazy::new(|| {
    let mut suffixes = vec![
        "amidopropyl betaine",
        "amidopropyl hydroxysultaine",
        "amidopropylamine oxide",
        "amidopropyl dimethylamine",
        "amphoacetate",
        "glucoside",
        "glutamate",
        "sodium isethionate",
        "isethionate",
        "sarcosinate",
        "methyl taurate",
        "taurate",
        "amide dea",
        "amide mea",
        "fatty acid",
        "fatty acids",
        "oil esters",
        "esters",
        "ethyl esters",
        "glycerides",
        "unsaponifiables",
        "sulfate",
        "ether sulfate",
        "polyglyceryl-3 esters",
        "crosspolymer",
        "betaine",
    ];
    suffixes.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    suffixes
});

/// Leading words that modify a PEG/PPG base and belong in the variation
pub static BASE_MODIFIER_PREFIXES: &[&str] = &["hydrogenated", "hydrolyzed", "ethoxylated", "sulfated"];

/// Base-ingredient aliases: lowercase spelling variant → canonical base
pub static BASE_ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        ("coconut", "Coconut"),
        ("coc", "Coconut"),
        ("coco", "Coconut"),
        ("cocoyl", "Coconut"),
        ("cocnut", "Coconut"),
        ("coconat", "Coconut"),
        ("cocunut", "Coconut"),
        ("coconutt", "Coconut"),
        ("cocos nucifera", "Coconut"),
        ("cocoa", "Cocoa"),
        ("theobroma cacao", "Cocoa"),
        ("shea", "Shea"),
        ("butyrospermum parkii", "Shea"),
        ("olive", "Olive"),
        ("oliv", "Olive"),
        ("olea europaea", "Olive"),
        ("palm", "Palm"),
        ("palm kernel", "Palm Kernel"),
        ("jojoba", "Jojoba"),
        ("simmondsia chinensis", "Jojoba"),
        ("castor", "Castor"),
        ("ricinus communis", "Castor"),
        ("sunflower", "Sunflower"),
        ("helianthus annuus", "Sunflower"),
        ("avocado", "Avocado"),
        ("babassu", "Babassu"),
        ("mango", "Mango"),
        ("almond", "Sweet Almond"),
        ("sweet almond", "Sweet Almond"),
        ("apricot", "Apricot"),
        ("argan", "Argan"),
        ("soy", "Soybean"),
        ("soybean", "Soybean"),
        ("rice", "Rice"),
        ("oat", "Oat"),
        ("wheat", "Wheat"),
        ("corn", "Corn"),
        ("sesame", "Sesame"),
        ("macadamia", "Macadamia"),
        ("murumuru", "Murumuru"),
        ("cupuacu", "Cupuacu"),
        ("kokum", "Kokum"),
    ]
    .into_iter()
    .collect()
});

/// Alias keys sorted longest first, for prefix matching
pub static BASE_ALIAS_KEYS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    let mut keys: Vec<&'static str> = BASE_ALIASES.keys().copied().collect();
    keys.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    keys
});

/// Compound suffixes tried when looking up a parent for a resolved base
pub static COMPOUND_SUFFIXES: &[&str] = &[
    "Butter",
    "Oil",
    "Wax",
    "Seed Oil",
    "Kernel Oil",
    "Nut Oil",
    "Fruit Oil",
    "Seed Butter",
    "Extract",
    "Leaf Extract",
];

/// Lowercase word test against the physical-form vocabulary
pub fn is_physical_form(word: &str) -> bool {
    PHYSICAL_FORMS.contains(word.to_ascii_lowercase().as_str())
}

/// Lowercase phrase test against the variation keyword vocabulary
pub fn is_variation_keyword(phrase: &str) -> bool {
    let lowered = phrase.trim().to_ascii_lowercase();
    VARIATION_KEYWORDS.contains(lowered.as_str())
}

pub fn is_modifier_trigger(word: &str) -> bool {
    MODIFIER_TRIGGERS.contains(word.to_ascii_lowercase().as_str())
}
