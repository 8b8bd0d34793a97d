// Risk categories and the per-category score vector.
//
// CategoryScores is the unit of exchange between providers, the calibrator,
// and ensemble fusion. Every category is always present; a provider that
// has no opinion on a category reports 0.0 for it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A named risk category scored by the classification providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Toxicity,
    Hate,
    Harassment,
    SexualContent,
    Violence,
    Profanity,
    SelfHarm,
    Spam,
    Pii,
}

impl Category {
    /// Every category, in canonical order.
    pub const ALL: [Category; 9] = [
        Category::Toxicity,
        Category::Hate,
        Category::Harassment,
        Category::SexualContent,
        Category::Violence,
        Category::Profanity,
        Category::SelfHarm,
        Category::Spam,
        Category::Pii,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Toxicity => "toxicity",
            Category::Hate => "hate",
            Category::Harassment => "harassment",
            Category::SexualContent => "sexual_content",
            Category::Violence => "violence",
            Category::Profanity => "profanity",
            Category::SelfHarm => "self_harm",
            Category::Spam => "spam",
            Category::Pii => "pii",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown category: {s}"))
    }
}

/// Scores for every risk category, each in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryScores {
    pub toxicity: f64,
    pub hate: f64,
    pub harassment: f64,
    pub sexual_content: f64,
    pub violence: f64,
    pub profanity: f64,
    pub self_harm: f64,
    pub spam: f64,
    pub pii: f64,
}

impl CategoryScores {
    pub fn get(&self, category: Category) -> f64 {
        match category {
            Category::Toxicity => self.toxicity,
            Category::Hate => self.hate,
            Category::Harassment => self.harassment,
            Category::SexualContent => self.sexual_content,
            Category::Violence => self.violence,
            Category::Profanity => self.profanity,
            Category::SelfHarm => self.self_harm,
            Category::Spam => self.spam,
            Category::Pii => self.pii,
        }
    }

    pub fn set(&mut self, category: Category, value: f64) {
        let slot = match category {
            Category::Toxicity => &mut self.toxicity,
            Category::Hate => &mut self.hate,
            Category::Harassment => &mut self.harassment,
            Category::SexualContent => &mut self.sexual_content,
            Category::Violence => &mut self.violence,
            Category::Profanity => &mut self.profanity,
            Category::SelfHarm => &mut self.self_harm,
            Category::Spam => &mut self.spam,
            Category::Pii => &mut self.pii,
        };
        *slot = value;
    }

    /// Iterate `(category, score)` pairs in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (Category, f64)> + '_ {
        Category::ALL.iter().map(move |&c| (c, self.get(c)))
    }

    /// Build a score vector by evaluating `f` for each category.
    pub fn from_fn(mut f: impl FnMut(Category) -> f64) -> Self {
        let mut scores = CategoryScores::default();
        for category in Category::ALL {
            scores.set(category, f(category));
        }
        scores
    }

    /// The highest-scoring category and its value.
    pub fn max_category(&self) -> (Category, f64) {
        self.iter()
            .fold((Category::Toxicity, f64::MIN), |best, (c, v)| {
                if v > best.1 {
                    (c, v)
                } else {
                    best
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_and_set_cover_every_category() {
        let mut scores = CategoryScores::default();
        for (i, category) in Category::ALL.iter().enumerate() {
            scores.set(*category, i as f64 / 10.0);
        }
        for (i, category) in Category::ALL.iter().enumerate() {
            assert!((scores.get(*category) - i as f64 / 10.0).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn category_parses_from_its_wire_name() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
        assert!("nonsense".parse::<Category>().is_err());
    }

    #[test]
    fn missing_fields_deserialize_as_zero() {
        let scores: CategoryScores = serde_json::from_str(r#"{"toxicity": 0.7}"#).unwrap();
        assert!((scores.toxicity - 0.7).abs() < f64::EPSILON);
        assert_eq!(scores.hate, 0.0);
    }

    #[test]
    fn max_category_picks_highest() {
        let scores = CategoryScores {
            harassment: 0.9,
            toxicity: 0.4,
            ..Default::default()
        };
        assert_eq!(scores.max_category(), (Category::Harassment, 0.9));
    }
}
