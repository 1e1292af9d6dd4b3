//! Part-of-speech category sets for the Sejong-style tag set.
//!
//! The tagger emits fine-grained tags (`NNG`, `JKO`, `EF`, …); retrieval and
//! scoring only care about coarse categories. The sets here match the ones
//! the lexical index was built with.

/// Coarse part-of-speech category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PosCategory {
    /// 명사 (common, proper, and pronoun nouns).
    Noun,
    /// 의존 명사.
    DependentNoun,
    /// 동사 및 서술격/부정 지정사.
    Verb,
    /// 보조 용언.
    Auxiliary,
    /// 형용사.
    Adjective,
    /// 관형사.
    Determiner,
    /// 부사.
    Adverb,
    /// 감탄사.
    Interjection,
    /// 조사.
    Particle,
    /// 어미.
    Ending,
    /// 접사.
    Affix,
    /// 어근.
    Radix,
    /// 수사.
    Numeral,
    /// 구두점.
    Punctuation,
    /// 외국어 및 기호.
    Symbol,
    /// 분석 불능 범주.
    Unknown,
}

/// The fine-grained tags belonging to a category.
pub fn category_tags(category: PosCategory) -> &'static [&'static str] {
    match category {
        PosCategory::Noun => &["NNG", "NNP", "NR", "NP"],
        PosCategory::DependentNoun => &["NNB"],
        PosCategory::Verb => &["VV", "VCP", "VCN"],
        PosCategory::Auxiliary => &["VX"],
        PosCategory::Adjective => &["VA"],
        PosCategory::Determiner => &["MM"],
        PosCategory::Adverb => &["MAG", "MAJ"],
        PosCategory::Interjection => &["IC"],
        PosCategory::Particle => &["JKS", "JKC", "JKG", "JKO", "JKB", "JKV", "JKQ", "JX", "JC"],
        PosCategory::Ending => &["EP", "EF", "EC", "ETN", "ETM"],
        PosCategory::Affix => &["XSN", "XSV", "XSA"],
        PosCategory::Radix => &["XR"],
        PosCategory::Numeral => &["SN"],
        PosCategory::Punctuation => &["SF", "SP", "SS", "SE", "SO", "SW"],
        PosCategory::Symbol => &["SL", "SH", "SW"],
        PosCategory::Unknown => &["NF", "NA", "NV"],
    }
}

/// Whether a fine-grained tag belongs to the given category.
pub fn is_category(tag: &str, category: PosCategory) -> bool {
    category_tags(category).contains(&tag)
}
