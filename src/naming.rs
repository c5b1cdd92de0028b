/// Zone naming: PascalCase → snake_case+plural entity mapping, and the
/// bit-exact physical table names the zone router and migration engine use.

/// One physical zone a table can live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Hot,
    Cold,
    /// Regular (non-hot-supported) tables use a single fixed name.
    Fixed,
}

/// `{network}_hot_{snake}` / `{network}_cold_{snake}` / `{network}_{snake}`.
pub fn physical_table(network: &str, zone: Zone, snake: &str) -> String {
    match zone {
        Zone::Hot => format!("{network}_hot_{snake}"),
        Zone::Cold => format!("{network}_cold_{snake}"),
        Zone::Fixed => format!("{network}_{snake}"),
    }
}

/// PascalCase entity kind → snake_case, pluralized table name.
///
/// This is a simplification relative to a full English inflector: it
/// handles the common cases (trailing `y` → `ies`; trailing `s`/`x`/`ch`/
/// `sh` → `+es`; otherwise `+s`) but does not special-case irregular
/// plurals. Only "PascalCase → snake_case + plural" is required here, not
/// grammatical correctness for every noun.
pub fn pascal_to_snake_plural(kind: &str) -> String {
    let snake = pascal_to_snake(kind);
    pluralize(&snake)
}

fn pascal_to_snake(kind: &str) -> String {
    let mut out = String::with_capacity(kind.len() + 4);
    let mut prev_lower_or_digit = false;
    for (i, c) in kind.chars().enumerate() {
        if c.is_uppercase() {
            if i != 0 && prev_lower_or_digit {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower_or_digit = false;
        } else {
            out.push(c);
            prev_lower_or_digit = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    out
}

fn pluralize(snake: &str) -> String {
    if let Some(stem) = snake.strip_suffix('y') {
        if !stem.ends_with(|c: char| "aeiou".contains(c)) {
            return format!("{stem}ies");
        }
    }
    if snake.ends_with('s')
        || snake.ends_with('x')
        || snake.ends_with("ch")
        || snake.ends_with("sh")
    {
        return format!("{snake}es");
    }
    format!("{snake}s")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_simple_pascal_case() {
        assert_eq!(pascal_to_snake_plural("Transfer"), "transfers");
        assert_eq!(pascal_to_snake_plural("BlockHeader"), "block_headers");
    }

    #[test]
    fn pluralizes_trailing_y() {
        assert_eq!(pascal_to_snake_plural("Authority"), "authorities");
    }

    #[test]
    fn pluralizes_trailing_sibilants() {
        assert_eq!(pascal_to_snake_plural("Address"), "addresses");
        assert_eq!(pascal_to_snake_plural("Batch"), "batches");
    }

    #[test]
    fn physical_names_are_bit_exact() {
        assert_eq!(physical_table("ethereum", Zone::Hot, "transfers"), "ethereum_hot_transfers");
        assert_eq!(physical_table("ethereum", Zone::Cold, "transfers"), "ethereum_cold_transfers");
        assert_eq!(physical_table("ethereum", Zone::Fixed, "governance_votes"), "ethereum_governance_votes");
    }
}
