//! Keyword-based query and persona classification
//!
//! All lexical heuristics used by selection, confidence scoring and
//! cross-validation live here, behind the [`Classifier`] trait. The keyword
//! tables are bilingual (English and Chinese) and versioned as a unit with
//! [`KEYWORD_TABLE_VERSION`]; bump it whenever a table changes.
//!
//! English terms are matched as word prefixes (`analy` matches "analysis"
//! and "analyze"); Chinese terms are matched as plain substrings.

use std::collections::HashSet;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::persona::Persona;

/// Version of the keyword tables below
pub const KEYWORD_TABLE_VERSION: u32 = 1;

// ─────────────────────────────────────────────────────────────────
// Classification Types
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Analysis,
    Creative,
    Problem,
    Strategy,
    Review,
    General,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryCategory {
    Technical,
    Business,
    Product,
    Design,
}

impl QueryCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryCategory::Technical => "technical",
            QueryCategory::Business => "business",
            QueryCategory::Product => "product",
            QueryCategory::Design => "design",
        }
    }
}

/// Behavioral class of a persona
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Archetype {
    Critical,
    Creative,
    Analytical,
    Supportive,
}

impl Archetype {
    pub const ALL: [Archetype; 4] = [
        Archetype::Critical,
        Archetype::Creative,
        Archetype::Analytical,
        Archetype::Supportive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Archetype::Critical => "critical",
            Archetype::Creative => "creative",
            Archetype::Analytical => "analytical",
            Archetype::Supportive => "supportive",
        }
    }
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Set of archetypes a persona (or a roster) covers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchetypeSet(u8);

impl ArchetypeSet {
    fn bit(archetype: Archetype) -> u8 {
        1 << archetype as u8
    }

    pub fn insert(&mut self, archetype: Archetype) {
        self.0 |= Self::bit(archetype);
    }

    pub fn contains(&self, archetype: Archetype) -> bool {
        self.0 & Self::bit(archetype) != 0
    }

    pub fn union(self, other: ArchetypeSet) -> ArchetypeSet {
        ArchetypeSet(self.0 | other.0)
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Archetype> + '_ {
        Archetype::ALL.into_iter().filter(|a| self.contains(*a))
    }
}

impl FromIterator<Archetype> for ArchetypeSet {
    fn from_iter<I: IntoIterator<Item = Archetype>>(iter: I) -> Self {
        let mut set = ArchetypeSet::default();
        for a in iter {
            set.insert(a);
        }
        set
    }
}

/// Result of classifying a query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryAnalysis {
    pub query_type: QueryType,
    pub category: Option<QueryCategory>,
    /// At most ten lowercase, non-stopword terms
    pub keywords: Vec<String>,
    pub needs_critical: bool,
    pub needs_creative: bool,
    pub needs_analytical: bool,
    pub is_complex: bool,
    pub is_innovative: bool,
}

/// Theme a sentence of analysis text can belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Theme {
    Risk,
    Opportunity,
    Recommendation,
}

// ─────────────────────────────────────────────────────────────────
// Classifier Trait
// ─────────────────────────────────────────────────────────────────

/// Lexical heuristics over queries, personas and analysis text
pub trait Classifier: Send + Sync {
    /// Version of the underlying keyword tables
    fn version(&self) -> u32;

    fn analyze_query(&self, query: &str) -> QueryAnalysis;

    /// Number of type keywords found in the persona's name, goal or rule
    fn type_matches(&self, persona: &Persona, query_type: QueryType) -> usize;

    fn archetypes(&self, persona: &Persona) -> ArchetypeSet;

    /// Query complexity in [0, 1]
    fn complexity(&self, query: &str) -> f64;

    /// Lowercase, non-stopword terms longer than one character
    fn extract_keywords(&self, text: &str) -> Vec<String>;

    /// Polarity normalized by word count; positive is optimistic
    fn sentiment(&self, text: &str) -> f64;

    /// Phrases following recommendation connectives ("should", "建议" ...)
    fn extract_recommendations(&self, text: &str) -> Vec<String>;

    fn mentions(&self, text: &str, theme: Theme) -> bool;

    /// Heuristic confidence of a single analysis text in [0, 1]
    fn analysis_confidence(&self, text: &str) -> f64;
}

// ─────────────────────────────────────────────────────────────────
// Keyword Tables
// ─────────────────────────────────────────────────────────────────

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "of", "to", "in", "on", "for", "and", "or", "but", "is", "are", "be",
    "this", "that", "it", "its", "with", "how", "what", "why", "we", "our", "my", "do", "does",
    "can", "as", "at", "by", "from", "about", "into", "should", "would", "could", "there",
    "的", "是", "在", "有", "和", "与", "或", "但", "如何", "什么", "为什么", "怎么",
];

const TYPE_KEYWORDS: &[(QueryType, &[&str])] = &[
    (QueryType::Analysis, &["analy", "evaluat", "assess", "research", "investigat", "分析", "评估", "研究", "调研"]),
    (QueryType::Creative, &["creativ", "idea", "innovat", "design", "brainstorm", "创意", "想法", "创新", "设计"]),
    (QueryType::Problem, &["problem", "bug", "error", "failure", "broken", "问题", "错误", "故障"]),
    (QueryType::Strategy, &["strateg", "plan", "roadmap", "proposal", "advice", "策略", "计划", "方案", "建议"]),
    (QueryType::Review, &["review", "critique", "audit", "inspect", "评价", "审查", "检查"]),
];

/// Terms that make a persona relevant to a query type
const TYPE_PERSONA_KEYWORDS: &[(QueryType, &[&str])] = &[
    (QueryType::Analysis, &["analy", "research", "evaluat", "reflect", "分析", "研究", "评估", "自省"]),
    (QueryType::Creative, &["creativ", "innovat", "imagin", "design", "创意", "创新", "想象", "设计"]),
    (QueryType::Problem, &["problem", "solv", "debug", "grumpy", "问题", "解决", "调试", "暴躁"]),
    (QueryType::Strategy, &["strateg", "plan", "advi", "product", "策略", "规划", "建议", "产品"]),
    (QueryType::Review, &["review", "evaluat", "inspect", "grumpy", "审查", "评价", "检查", "暴躁"]),
];

const CATEGORY_KEYWORDS: &[(QueryCategory, &[&str])] = &[
    (QueryCategory::Technical, &["techn", "code", "coding", "program", "develop", "software", "engineer", "技术", "代码", "编程", "开发"]),
    (QueryCategory::Business, &["business", "market", "sales", "revenue", "商业", "市场", "营销", "销售"]),
    (QueryCategory::Product, &["product", "feature", "user", "产品", "功能", "用户"]),
    (QueryCategory::Design, &["design", "ui", "ux", "interface", "设计", "界面"]),
];

const NEEDS_CRITICAL: &[&str] = &["risk", "problem", "weakness", "drawback", "flaw", "challeng", "difficult", "concern", "风险", "问题", "缺点", "不足", "挑战", "困难"];
const NEEDS_CREATIVE: &[&str] = &["innovat", "creativ", "idea", "inspir", "breakthrough", "novel", "创新", "创意", "想法", "灵感", "突破", "新颖"];
const NEEDS_ANALYTICAL: &[&str] = &["analy", "data", "statistic", "logic", "reason", "conclusion", "分析", "数据", "统计", "逻辑", "推理", "结论"];
const INNOVATIVE: &[&str] = &["innovat", "creativ", "idea", "inspir", "design", "breakthrough", "novel", "unique", "创新", "创意", "想法", "灵感", "设计", "突破", "新颖", "独特"];
const COMPLEXITY_WORDS: &[&str] = &["multiple", "various", "comprehensive", "overall", "in-depth", "detailed", "多个", "多种", "综合", "全面", "深入", "详细"];

const ARCHETYPE_KEYWORDS: &[(Archetype, &[&str])] = &[
    (Archetype::Critical, &["critic", "skeptic", "challeng", "question", "scrutin", "strict", "harsh", "grumpy", "批判", "质疑", "挑战", "审视", "暴躁", "严格"]),
    (Archetype::Creative, &["creativ", "innovat", "imagin", "inspir", "artist", "design", "创意", "创新", "想象", "灵感", "艺术", "设计"]),
    (Archetype::Analytical, &["analy", "logic", "rational", "data", "research", "reflect", "分析", "逻辑", "理性", "数据", "研究", "自省"]),
    (Archetype::Supportive, &["encourag", "support", "positive", "cheer", "strength", "fan", "empath", "鼓励", "支持", "积极", "正面", "优点", "亮点", "粉丝"]),
];

const POSITIVE_WORDS: &[&str] = &["good", "great", "excellent", "success", "opportunit", "advantage", "strength", "recommend", "feasible", "effective", "positive", "promising", "好", "优秀", "成功", "机会", "优势", "推荐", "可行", "有效", "积极", "正面"];
const NEGATIVE_WORDS: &[&str] = &["problem", "difficult", "risk", "challeng", "weakness", "drawback", "fail", "danger", "negative", "flaw", "concern", "问题", "困难", "风险", "挑战", "不足", "缺点", "失败", "危险", "消极", "负面"];

const THEME_KEYWORDS: &[(Theme, &[&str])] = &[
    (Theme::Risk, &["risk", "problem", "风险", "问题"]),
    (Theme::Opportunity, &["opportunit", "advantage", "strength", "机会", "优势"]),
    (Theme::Recommendation, &["recommend", "suggest", "advice", "建议", "推荐"]),
];

const RECOMMENDATION_MARKERS: &[&str] = &["recommend", "suggest", "具体建议", "建议"];
const RISK_MARKERS: &[&str] = &["risk", "风险"];
const EVIDENCE_MARKERS: &[&str] = &["data", "evidence", "fact", "数据", "事实"];

// ─────────────────────────────────────────────────────────────────
// Compiled Patterns
// ─────────────────────────────────────────────────────────────────

/// Alternation of `terms`: ASCII terms anchored at a word start
fn pattern(terms: &[&str]) -> Regex {
    let alternatives: Vec<String> = terms
        .iter()
        .map(|t| {
            if t.is_ascii() {
                format!(r"\b{}", regex::escape(t))
            } else {
                regex::escape(t)
            }
        })
        .collect();
    Regex::new(&format!("(?i)(?:{})", alternatives.join("|"))).expect("escaped keyword pattern")
}

struct Patterns {
    types: Vec<(QueryType, Regex)>,
    type_persona: Vec<(QueryType, Vec<Regex>)>,
    categories: Vec<(QueryCategory, Regex)>,
    needs_critical: Regex,
    needs_creative: Regex,
    needs_analytical: Regex,
    innovative: Regex,
    complexity_words: Regex,
    compound: Regex,
    sentence_split: Regex,
    token_split: Regex,
    archetypes: Vec<(Archetype, Regex)>,
    positive: Regex,
    negative: Regex,
    themes: Vec<(Theme, Regex)>,
    recommendation_markers: Regex,
    risk_markers: Regex,
    evidence_markers: Regex,
    recommendations: Vec<Regex>,
}

static PATTERNS: Lazy<Patterns> = Lazy::new(|| Patterns {
    types: TYPE_KEYWORDS.iter().map(|(t, k)| (*t, pattern(k))).collect(),
    type_persona: TYPE_PERSONA_KEYWORDS
        .iter()
        .map(|(t, k)| (*t, k.iter().map(|w| pattern(&[*w])).collect()))
        .collect(),
    categories: CATEGORY_KEYWORDS.iter().map(|(c, k)| (*c, pattern(k))).collect(),
    needs_critical: pattern(NEEDS_CRITICAL),
    needs_creative: pattern(NEEDS_CREATIVE),
    needs_analytical: pattern(NEEDS_ANALYTICAL),
    innovative: pattern(INNOVATIVE),
    complexity_words: pattern(COMPLEXITY_WORDS),
    compound: Regex::new(r"(?i)\bboth\b.+\band\b|\bnot only\b.+\bbut\b|\banaly\w*\b.+\band\b|分析.*和|既.*又|不仅.*还")
        .expect("compound pattern"),
    sentence_split: Regex::new(r"[.!?;:，。！？；：]").expect("sentence pattern"),
    token_split: Regex::new(r#"[\s,.!?;:()"'，。！？；：、]+"#).expect("token pattern"),
    archetypes: ARCHETYPE_KEYWORDS.iter().map(|(a, k)| (*a, pattern(k))).collect(),
    positive: pattern(POSITIVE_WORDS),
    negative: pattern(NEGATIVE_WORDS),
    themes: THEME_KEYWORDS.iter().map(|(t, k)| (*t, pattern(k))).collect(),
    recommendation_markers: pattern(RECOMMENDATION_MARKERS),
    risk_markers: pattern(RISK_MARKERS),
    evidence_markers: pattern(EVIDENCE_MARKERS),
    recommendations: [
        r"(?i)\b(?:should|suggests?|recommends?|need to|could)\b\s*:?\s*([^.!?\n]+)",
        r"(?:建议|推荐)[：:]?([^。！？\n]+)",
        r"(?:应该|可以|需要)([^。！？\n]+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("recommendation pattern"))
    .collect(),
});

static STOPWORD_SET: Lazy<HashSet<&'static str>> = Lazy::new(|| STOPWORDS.iter().copied().collect());

// ─────────────────────────────────────────────────────────────────
// Keyword Classifier
// ─────────────────────────────────────────────────────────────────

/// [`Classifier`] backed by the static keyword tables
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }

    fn sentence_count(query: &str) -> usize {
        PATTERNS
            .sentence_split
            .split(query)
            .filter(|s| !s.trim().is_empty())
            .count()
    }

    fn complexity_indicators(query: &str) -> [bool; 4] {
        let p = &*PATTERNS;
        [
            query.chars().count() > 100,
            p.complexity_words.is_match(query),
            Self::sentence_count(query) > 2,
            p.compound.is_match(query),
        ]
    }
}

impl Classifier for KeywordClassifier {
    fn version(&self) -> u32 {
        KEYWORD_TABLE_VERSION
    }

    fn analyze_query(&self, query: &str) -> QueryAnalysis {
        let p = &*PATTERNS;
        let lowered = query.to_lowercase();

        let query_type = p
            .types
            .iter()
            .find(|(_, re)| re.is_match(&lowered))
            .map_or(QueryType::General, |(t, _)| *t);
        let category = p
            .categories
            .iter()
            .find(|(_, re)| re.is_match(&lowered))
            .map(|(c, _)| *c);

        let mut keywords = Vec::new();
        for word in self.extract_keywords(&lowered) {
            if !keywords.contains(&word) {
                keywords.push(word);
            }
            if keywords.len() == 10 {
                break;
            }
        }

        QueryAnalysis {
            query_type,
            category,
            keywords,
            needs_critical: p.needs_critical.is_match(&lowered),
            needs_creative: p.needs_creative.is_match(&lowered),
            needs_analytical: p.needs_analytical.is_match(&lowered),
            is_complex: Self::complexity_indicators(&lowered)
                .iter()
                .filter(|b| **b)
                .count()
                >= 2,
            is_innovative: p.innovative.is_match(&lowered),
        }
    }

    fn type_matches(&self, persona: &Persona, query_type: QueryType) -> usize {
        let Some((_, patterns)) = PATTERNS.type_persona.iter().find(|(t, _)| *t == query_type) else {
            return 0;
        };
        let profile = persona.profile_text();
        patterns.iter().filter(|re| re.is_match(&profile)).count()
    }

    fn archetypes(&self, persona: &Persona) -> ArchetypeSet {
        let mut text = persona.profile_text();
        if let Some(category) = &persona.category {
            text.push(' ');
            text.push_str(&category.to_lowercase());
        }
        for tag in &persona.tags {
            text.push(' ');
            text.push_str(&tag.to_lowercase());
        }

        PATTERNS
            .archetypes
            .iter()
            .filter(|(_, re)| re.is_match(&text))
            .map(|(a, _)| *a)
            .collect()
    }

    fn complexity(&self, query: &str) -> f64 {
        let [long, wordy, multi_sentence, compound] =
            Self::complexity_indicators(&query.to_lowercase());
        let mut score = 0.5;
        if long {
            score += 0.3;
        }
        for flag in [wordy, multi_sentence, compound] {
            if flag {
                score += 0.1;
            }
        }
        f64::min(score, 1.0)
    }

    fn extract_keywords(&self, text: &str) -> Vec<String> {
        PATTERNS
            .token_split
            .split(&text.to_lowercase())
            .filter(|w| w.chars().count() > 1 && !STOPWORD_SET.contains(w))
            .map(str::to_string)
            .collect()
    }

    fn sentiment(&self, text: &str) -> f64 {
        let p = &*PATTERNS;
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return 0.0;
        }
        let score: i64 = words
            .iter()
            .map(|w| {
                let mut s = 0;
                if p.positive.is_match(w) {
                    s += 1;
                }
                if p.negative.is_match(w) {
                    s -= 1;
                }
                s
            })
            .sum();
        score as f64 / words.len() as f64
    }

    fn extract_recommendations(&self, text: &str) -> Vec<String> {
        let mut found = Vec::new();
        for re in &PATTERNS.recommendations {
            for caps in re.captures_iter(text) {
                if let Some(m) = caps.get(1) {
                    let phrase = m.as_str().trim();
                    if phrase.chars().count() > 5 {
                        found.push(phrase.to_string());
                    }
                }
            }
        }
        found
    }

    fn mentions(&self, text: &str, theme: Theme) -> bool {
        PATTERNS
            .themes
            .iter()
            .any(|(t, re)| *t == theme && re.is_match(text))
    }

    fn analysis_confidence(&self, text: &str) -> f64 {
        let p = &*PATTERNS;
        let mut confidence = 0.5;
        if text.chars().count() > 100 {
            confidence += 0.2;
        }
        for marker in [&p.recommendation_markers, &p.risk_markers, &p.evidence_markers] {
            if marker.is_match(text) {
                confidence += 0.1;
            }
        }
        f64::min(confidence, 1.0)
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::default_personas;

    fn persona(id: &str) -> Persona {
        default_personas().into_iter().find(|p| p.id == id).unwrap()
    }

    #[test]
    fn test_query_type_and_category() {
        let c = KeywordClassifier::new();
        let a = c.analyze_query("Evaluate risk of launching this product now");
        assert_eq!(a.query_type, QueryType::Analysis);
        assert_eq!(a.category, Some(QueryCategory::Product));
        assert!(a.needs_critical);
        assert!(!a.needs_creative);
        assert!(a.keywords.contains(&"risk".to_string()));
        assert!(!a.keywords.contains(&"of".to_string()));

        let zh = c.analyze_query("我们需要一些创新的想法来设计新的界面");
        assert_eq!(zh.query_type, QueryType::Creative);
        assert!(zh.needs_creative);
        assert!(zh.is_innovative);

        assert_eq!(c.analyze_query("hello there").query_type, QueryType::General);
    }

    #[test]
    fn test_ascii_terms_match_word_starts_only() {
        let c = KeywordClassifier::new();
        // "ui" inside "build" must not classify as design
        assert_eq!(c.analyze_query("build a quick thing").category, None);
    }

    #[test]
    fn test_keywords_capped_and_unique() {
        let c = KeywordClassifier::new();
        let a = c.analyze_query("alpha beta gamma delta epsilon zeta eta theta iota kappa lambda alpha");
        assert_eq!(a.keywords.len(), 10);
        assert_eq!(a.keywords[0], "alpha");
    }

    #[test]
    fn test_default_persona_archetypes() {
        let c = KeywordClassifier::new();
        assert!(c.archetypes(&persona("grumpy-critic")).contains(Archetype::Critical));
        assert!(c.archetypes(&persona("mece-analyst")).contains(Archetype::Analytical));
        assert!(c.archetypes(&persona("warm-sister")).contains(Archetype::Supportive));

        let fan = c.archetypes(&persona("enthusiastic-fan"));
        assert!(fan.contains(Archetype::Supportive));
        assert!(fan.contains(Archetype::Creative));
    }

    #[test]
    fn test_complexity_heuristic() {
        let c = KeywordClassifier::new();
        assert_eq!(c.complexity("short question"), 0.5);

        let long = "Give a comprehensive review of our pricing. ".repeat(3);
        assert!(c.complexity(&long) > 0.7);
        assert!(c.analyze_query(&long).is_complex);
    }

    #[test]
    fn test_sentiment_polarity() {
        let c = KeywordClassifier::new();
        assert!(c.sentiment("great opportunity and real strength") > 0.1);
        assert!(c.sentiment("serious risk and a clear problem") < -0.1);
        assert_eq!(c.sentiment(""), 0.0);
    }

    #[test]
    fn test_extract_recommendations() {
        let c = KeywordClassifier::new();
        let recs = c.extract_recommendations(
            "You should run a small pilot first. We suggest: hire two engineers. 建议：先做小规模测试再推广。",
        );
        assert!(recs.contains(&"run a small pilot first".to_string()));
        assert!(recs.contains(&"hire two engineers".to_string()));
        assert!(recs.contains(&"先做小规模测试再推广".to_string()));
        // Too short
        assert!(c.extract_recommendations("You should go.").is_empty());
    }

    #[test]
    fn test_analysis_confidence() {
        let c = KeywordClassifier::new();
        assert_eq!(c.analysis_confidence("ok"), 0.5);

        let rich = format!(
            "{} We recommend acting now; the main risk is cost, and the data supports it.",
            "x".repeat(100)
        );
        assert!((c.analysis_confidence(&rich) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_archetype_set() {
        let set: ArchetypeSet = [Archetype::Critical, Archetype::Supportive].into_iter().collect();
        assert_eq!(set.len(), 2);
        assert!(set.contains(Archetype::Critical));
        assert!(!set.contains(Archetype::Creative));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![Archetype::Critical, Archetype::Supportive]);
    }
}
