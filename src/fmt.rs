/// Normalize a free-text transaction label to the product's capitalization
/// convention: words of one or two letters stay lower-case (conjunctions,
/// prepositions), longer words get a leading capital. Whitespace collapses
/// to single spaces. Applying it twice yields the same string.
pub fn format_concept(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| {
            if word.chars().count() <= 2 {
                word.to_lowercase()
            } else {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => {
                        first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                    }
                    None => String::new(),
                }
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
