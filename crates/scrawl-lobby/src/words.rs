//! Built-in word packs, guess normalization, and hint arithmetic.

use serde::{Deserialize, Serialize};

/// A built-in list of words to draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WordPack {
    #[default]
    English,
    German,
    French,
    Turkish,
}

impl WordPack {
    pub const ALL: [WordPack; 4] = [Self::English, Self::German, Self::French, Self::Turkish];

    /// Looks a pack up by its identifier (`"english"`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "english" => Some(Self::English),
            "german" => Some(Self::German),
            "french" => Some(Self::French),
            "turkish" => Some(Self::Turkish),
            _ => None,
        }
    }

    /// The pack identifier stored in the lobby document.
    pub fn name(&self) -> &'static str {
        match self {
            Self::English => "english",
            Self::German => "german",
            Self::French => "french",
            Self::Turkish => "turkish",
        }
    }

    fn source(&self) -> &'static str {
        match self {
            Self::English => include_str!("../words/english.txt"),
            Self::German => include_str!("../words/german.txt"),
            Self::French => include_str!("../words/french.txt"),
            Self::Turkish => include_str!("../words/turkish.txt"),
        }
    }

    /// All words of the pack, folded, in file order.
    pub fn words(&self) -> Vec<String> {
        let folder = self.folder();
        self.source()
            .lines()
            .map(|line| folder.fold(line))
            .filter(|word| !word.is_empty())
            .collect()
    }

    /// The case folder for this pack's language.
    pub fn folder(&self) -> WordFolder {
        WordFolder {
            turkic: matches!(self, Self::Turkish),
        }
    }
}

/// Normalizes words and guesses so they compare equal regardless of case
/// and surrounding whitespace.
///
/// Lower-casing is language sensitive: Turkish has a dotted and a dotless
/// `i`, so `I` folds to `ı` and `İ` to `i` there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WordFolder {
    turkic: bool,
}

impl WordFolder {
    pub fn fold(&self, input: &str) -> String {
        let trimmed = input.trim();
        if !self.turkic {
            return trimmed.to_lowercase();
        }
        let mut out = String::with_capacity(trimmed.len());
        for c in trimmed.chars() {
            match c {
                'I' => out.push('ı'),
                'İ' => out.push('i'),
                other => out.extend(other.to_lowercase()),
            }
        }
        out
    }
}

/// How many hints a word gets: 30% of its letters rounded up, but always
/// leaving at least one letter hidden.
pub fn hint_count(word: &str) -> u32 {
    let letters = word.chars().filter(|c| !c.is_whitespace()).count() as u32;
    if letters <= 1 {
        return 0;
    }
    let count = (letters * 3).div_ceil(10);
    count.min(letters - 1)
}

/// Levenshtein distance over chars.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}
