//! Material mention parsing and normalization.
//!
//! Fabric-details text and JSON-LD material strings arrive in free form
//! ("86% Recycled Nylon / 14% Elastane", "Poliestere riciclato"). This module
//! splits blends, pulls out percentage compositions, and folds synonyms and
//! qualifier words down to canonical material names for the normalized
//! `materials` / `product_materials` tables.

use std::sync::OnceLock;

use regex::Regex;

/// Collapse runs of whitespace to single spaces and trim.
pub fn squash_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One parsed material mention: canonical name, optional percentage, and the
/// text fragment it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    pub material: String,
    pub percentage: Option<f64>,
    pub raw: String,
}

/// Canonical name → spellings seen in the wild (several locales).
const SYNONYMS: &[(&str, &[&str])] = &[
    ("polyester", &["polyester", "poliestere"]),
    ("nylon", &["nylon", "polyamide", "polyamid", "poliammide"]),
    ("cotton", &["cotton", "cotone"]),
    ("elastane", &["elastane", "spandex", "elastan", "elastano", "lycra"]),
    ("wool", &["wool", "lana", "merino wool", "merino"]),
    ("down", &["down", "goose down", "duck down"]),
    ("hemp", &["hemp", "canapa"]),
    ("viscose", &["viscose", "rayon"]),
    ("modal", &["modal"]),
    ("polypropylene", &["polypropylene", "polipropilene"]),
    ("tencel", &["tencel", "lyocell"]),
    ("silk", &["silk", "seta"]),
    ("rubber", &["rubber", "gomma"]),
    ("gore-tex", &["gore-tex", "gore tex"]),
];

fn qualifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\b(recycled|riciclato|riciclata|post[- ]consumer|pre[- ]consumer|organic|biologico|responsible|certified)\b",
        )
        .expect("static regex")
    })
}

fn junk_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9 \-/\.]").expect("static regex"))
}

fn pct_before_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?P<pct>\d{1,3}(?:\.\d+)?)\s*%\s*(?P<mat>[A-Za-z][A-Za-z \-/\.]+)")
            .expect("static regex")
    })
}

fn pct_after_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?P<mat>[A-Za-z][A-Za-z \-/\.]+?)\s*(?P<pct>\d{1,3}(?:\.\d+)?)\s*%")
            .expect("static regex")
    })
}

fn blend_split_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[,/;]|\s+\+\s+").expect("static regex"))
}

fn candidate_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[A-Za-z][A-Za-z \-/\.]{2,}\b").expect("static regex"))
}

/// Reduce a raw material string to its canonical name.
///
/// Strips qualifier words (recycled, organic, ...), punctuation noise, then
/// matches synonyms on word boundaries. Unknown materials fall back to the
/// first blend/hyphen segment.
pub fn normalize_material_name(name: &str) -> Option<String> {
    let lowered = squash_ws(name).to_lowercase();
    if lowered.is_empty() {
        return None;
    }
    let stripped = qualifier_re().replace_all(&lowered, "");
    let cleaned = squash_ws(&junk_re().replace_all(&stripped, " "));
    if cleaned.is_empty() {
        return None;
    }

    let padded = format!(" {cleaned} ");
    for (canonical, spellings) in SYNONYMS {
        for spelling in *spellings {
            if padded.contains(&format!(" {spelling} ")) {
                return Some((*canonical).to_string());
            }
        }
    }

    let fallback = cleaned
        .split('/')
        .next()
        .and_then(|s| s.split('-').next())
        .map(str::trim)
        .unwrap_or("");
    if fallback.is_empty() {
        None
    } else {
        Some(fallback.to_string())
    }
}

/// Parse percentage compositions out of a mention string.
///
/// Understands both "30% nylon" and "nylon 30%" orders across blend
/// separators. A mention with no percentages at all still yields bare
/// material names so the link table records the association.
pub fn extract_compositions(text: &str) -> Vec<Composition> {
    let text = squash_ws(text);
    if text.is_empty() {
        return Vec::new();
    }

    let mut out: Vec<Composition> = Vec::new();
    for part in blend_split_re().split(&text).map(str::trim).filter(|p| !p.is_empty()) {
        for caps in pct_before_re().captures_iter(part) {
            if let Some(material) = normalize_material_name(&caps["mat"]) {
                out.push(Composition {
                    material,
                    percentage: caps["pct"].parse().ok(),
                    raw: part.to_string(),
                });
            }
        }
        for caps in pct_after_re().captures_iter(part) {
            if let Some(material) = normalize_material_name(&caps["mat"]) {
                out.push(Composition {
                    material,
                    percentage: caps["pct"].parse().ok(),
                    raw: part.to_string(),
                });
            }
        }
    }

    if out.is_empty() {
        for caps in candidate_re().find_iter(&text) {
            if let Some(material) = normalize_material_name(caps.as_str()) {
                if material.len() >= 3 {
                    out.push(Composition {
                        material,
                        percentage: None,
                        raw: text.clone(),
                    });
                }
            }
        }
    }

    // Dedup while keeping first-seen order.
    let mut seen = std::collections::HashSet::new();
    out.retain(|c| {
        seen.insert((
            c.material.clone(),
            c.percentage.map(f64::to_bits),
            c.raw.clone(),
        ))
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_synonyms_and_qualifiers() {
        assert_eq!(normalize_material_name("Recycled Polyester"), Some("polyester".into()));
        assert_eq!(normalize_material_name("Poliammide"), Some("nylon".into()));
        assert_eq!(normalize_material_name("SPANDEX"), Some("elastane".into()));
        assert_eq!(normalize_material_name("Gore Tex"), Some("gore-tex".into()));
        assert_eq!(normalize_material_name("  "), None);
    }

    #[test]
    fn unknown_material_falls_back_to_first_segment() {
        assert_eq!(normalize_material_name("cordura/kevlar"), Some("cordura".into()));
    }

    #[test]
    fn parses_percent_before_material() {
        let comps = extract_compositions("100% Recycled Polyester");
        assert_eq!(comps.len(), 1);
        assert_eq!(comps[0].material, "polyester");
        assert_eq!(comps[0].percentage, Some(100.0));
    }

    #[test]
    fn parses_blends_with_both_orders() {
        let comps = extract_compositions("86% Nylon / Elastane 14%");
        let pairs: Vec<_> = comps
            .iter()
            .map(|c| (c.material.as_str(), c.percentage))
            .collect();
        assert!(pairs.contains(&("nylon", Some(86.0))));
        assert!(pairs.contains(&("elastane", Some(14.0))));
    }

    #[test]
    fn mention_without_percentage_still_yields_material() {
        let comps = extract_compositions("Merino wool jersey");
        assert!(comps.iter().any(|c| c.material == "wool" && c.percentage.is_none()));
    }

    #[test]
    fn duplicate_compositions_collapse() {
        let comps = extract_compositions("50% cotton, 50% cotton");
        // same material+pct but distinct raw parts would stay; identical triples collapse
        let unique: std::collections::HashSet<_> =
            comps.iter().map(|c| (&c.material, &c.raw)).collect();
        assert_eq!(unique.len(), comps.len());
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(extract_compositions("   ").is_empty());
    }
}
