use crate::models::Category;

/// Resolve a free-text category name against the caller-supplied list by
/// exact case-insensitive match. The list is already scoped to the active
/// organization; no fuzzy matching.
pub fn resolve_category(name: &str, categories: &[Category]) -> Option<i64> {
    let wanted = name.trim();
    if wanted.is_empty() {
        return None;
    }
    let wanted = wanted.to_uppercase();
    categories
        .iter()
        .find(|c| c.name.to_uppercase() == wanted)
        .map(|c| c.id)
}

/// Fold an unmatched category name into the description as an annotation
/// line, so the user's text is preserved instead of silently dropped.
pub fn annotate_unmatched(descripcion: Option<String>, raw_name: &str) -> Option<String> {
    let note = format!("Categoría original: {}", raw_name.trim());
    Some(match descripcion {
        Some(d) if !d.is_empty() => format!("{d}\n{note}"),
        _ => note,
    })
}
