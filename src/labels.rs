use std::{fmt, str::FromStr};

use serde::Serialize;
use thiserror::Error;

/// Leaf condition classes, in the order of the model's output vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Label {
    Anthracnose,
    #[serde(rename = "Bacterial_Blight")]
    BacterialBlight,
    #[serde(rename = "Black_Spot")]
    BlackSpot,
    Canker,
    #[serde(rename = "Curl_Virus")]
    CurlVirus,
    Deficiency,
    #[serde(rename = "Dry_Leaf")]
    DryLeaf,
    Greening,
    Healthy,
    #[serde(rename = "Sooty_Mould")]
    SootyMould,
    #[serde(rename = "Spider_Mites")]
    SpiderMites,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("class index {index} is outside the label catalog (size {size})")]
pub struct IndexOutOfRange {
    pub index: usize,
    pub size: usize,
}

impl Label {
    pub const ALL: [Label; 11] = [
        Label::Anthracnose,
        Label::BacterialBlight,
        Label::BlackSpot,
        Label::Canker,
        Label::CurlVirus,
        Label::Deficiency,
        Label::DryLeaf,
        Label::Greening,
        Label::Healthy,
        Label::SootyMould,
        Label::SpiderMites,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn as_str(self) -> &'static str {
        match self {
            Label::Anthracnose => "Anthracnose",
            Label::BacterialBlight => "Bacterial_Blight",
            Label::BlackSpot => "Black_Spot",
            Label::Canker => "Canker",
            Label::CurlVirus => "Curl_Virus",
            Label::Deficiency => "Deficiency",
            Label::DryLeaf => "Dry_Leaf",
            Label::Greening => "Greening",
            Label::Healthy => "Healthy",
            Label::SootyMould => "Sooty_Mould",
            Label::SpiderMites => "Spider_Mites",
        }
    }

    /// Treatment advice shown alongside a prediction.
    pub fn recommendations(self) -> &'static [&'static str] {
        match self {
            Label::Anthracnose => &[
                "Apply preventive fungicides such as chlorothalonil or mancozeb",
                "Improve air circulation between plants",
                "Remove and destroy infected leaves",
                "Avoid sprinkler irrigation, use drip irrigation instead",
                "Repeat treatments every 7-10 days during the wet season",
            ],
            Label::BacterialBlight => &[
                "Apply bactericidal antibiotics such as streptomycin",
                "Prune infected branches and disinfect tools",
                "Improve soil drainage to avoid excess moisture",
                "Use resistant varieties whenever possible",
                "Apply copper bactericide as a preventive measure",
            ],
            Label::BlackSpot => &[
                "Apply systemic fungicides such as tebuconazole",
                "Remove fallen leaves and plant debris",
                "Improve ventilation and spacing between plants",
                "Avoid excess moisture on the foliage",
                "Apply preventive treatments before the rainy season",
            ],
            Label::Canker => &[
                "Apply copper bactericide such as copper oxychloride",
                "Prune infected areas and disinfect tools",
                "Control the insect vectors that spread the disease",
                "Use certified disease-free plant material",
                "Apply preventive treatments during active growth periods",
            ],
            Label::CurlVirus => &[
                "Remove infected plants immediately",
                "Control insect vectors with systemic insecticides",
                "Use healthy, certified plant material",
                "Install physical barriers to protect the plants",
                "Monitor regularly to catch early symptoms",
            ],
            Label::Deficiency => &[
                "Apply balanced fertilizers based on a soil analysis",
                "Correct soil pH if needed (6.0-7.0)",
                "Improve mineral nutrition with micronutrients",
                "Run a soil analysis to identify specific deficiencies",
                "Apply foliar fertilizers for fast absorption",
            ],
            Label::DryLeaf => &[
                "Adjust the irrigation schedule to the plant's needs",
                "Improve soil drainage to avoid waterlogging",
                "Shelter plants from strong, dry winds",
                "Apply organic mulch to retain moisture",
                "Monitor soil moisture regularly",
            ],
            Label::Greening => &[
                "Remove infected plants to stop the spread",
                "Control psyllid vectors with systemic insecticides",
                "Use certified disease-free plant material",
                "Set up a regular monitoring program",
                "Apply preventive treatments during growth periods",
            ],
            Label::Healthy => &[
                "Keep up healthy growing practices",
                "Monitor regularly to catch problems early",
                "Apply balanced fertilizers as needed",
                "Maintain adequate irrigation and proper drainage",
                "Practice integrated pest management",
            ],
            Label::SootyMould => &[
                "Control honeydew-producing insects (aphids, scales)",
                "Apply insecticidal soaps to remove the insects",
                "Improve ventilation between plants",
                "Wash leaves with soapy water to remove honeydew",
                "Apply horticultural oils as a preventive measure",
            ],
            Label::SpiderMites => &[
                "Apply specific acaricides such as abamectin",
                "Raise ambient humidity to discourage mites",
                "Release natural predators such as phytoseiid mites",
                "Apply horticultural oils for mechanical control",
                "Monitor regularly to catch infestations early",
            ],
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Label::ALL
            .into_iter()
            .find(|label| label.as_str() == s)
            .ok_or(())
    }
}

pub fn label_for_index(index: usize) -> Result<Label, IndexOutOfRange> {
    Label::ALL.get(index).copied().ok_or(IndexOutOfRange {
        index,
        size: Label::COUNT,
    })
}

/// Unknown names get no advice rather than an error.
pub fn recommendations_for(name: &str) -> &'static [&'static str] {
    name.parse::<Label>()
        .map(Label::recommendations)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_index_in_range_maps_to_its_label() {
        for (i, expected) in Label::ALL.iter().enumerate() {
            assert_eq!(label_for_index(i), Ok(*expected));
        }
        assert_eq!(label_for_index(8), Ok(Label::Healthy));
    }

    #[test]
    fn index_past_catalog_fails() {
        assert_eq!(
            label_for_index(Label::COUNT),
            Err(IndexOutOfRange { index: 11, size: 11 })
        );
        assert!(label_for_index(usize::MAX).is_err());
    }

    #[test]
    fn names_round_trip_through_from_str() {
        for label in Label::ALL {
            assert_eq!(label.as_str().parse::<Label>(), Ok(label));
            assert_eq!(
                serde_json::to_value(label).unwrap(),
                serde_json::json!(label.as_str())
            );
        }
    }

    #[test]
    fn every_label_has_recommendations() {
        for label in Label::ALL {
            assert_eq!(label.recommendations().len(), 5, "{label}");
            assert_eq!(recommendations_for(label.as_str()), label.recommendations());
        }
    }

    #[test]
    fn unknown_label_has_no_recommendations() {
        assert!(recommendations_for("Powdery_Mildew").is_empty());
        assert!(recommendations_for("healthy").is_empty());
    }
}
