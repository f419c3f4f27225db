use serde::Serialize;

/// The three rephrased variants. This keyed shape is the response contract;
/// callers never see fewer or more than three fields.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Rephrased {
    pub formal: String,
    pub polite: String,
    pub casual: String,
}

const FORMAL_LABEL: &str = "Formal";
const POLITE_LABEL: &str = "Polite";
const CASUAL_LABEL: &str = "Casual";

/// Turns the model's free-text reply into exactly three labeled variants.
///
/// The model's output format is not contractually guaranteed: labels may be
/// missing, duplicated, or reordered, and numbering may be absent. All of
/// those are expected inputs here, not error conditions. For any input this
/// returns a well-formed three-variant result.
pub fn normalize(raw: &str) -> Rephrased {
    if raw.trim().is_empty() {
        return Rephrased {
            formal: missing_variant(FORMAL_LABEL),
            polite: missing_variant(POLITE_LABEL),
            casual: missing_variant(CASUAL_LABEL),
        };
    }

    let lines: Vec<String> = raw.lines().map(strip_numbering).collect();

    let formal = extract_labeled(&lines, FORMAL_LABEL);
    let polite = extract_labeled(&lines, POLITE_LABEL);
    let casual = extract_labeled(&lines, CASUAL_LABEL);

    // If any label matched, stay in labeled mode and fill the gaps with
    // placeholder text. Positional guessing on a partially labeled reply
    // would misattribute variants.
    if formal.is_some() || polite.is_some() || casual.is_some() {
        return Rephrased {
            formal: formal.unwrap_or_else(|| missing_variant(FORMAL_LABEL)),
            polite: polite.unwrap_or_else(|| missing_variant(POLITE_LABEL)),
            casual: casual.unwrap_or_else(|| missing_variant(CASUAL_LABEL)),
        };
    }

    positional(&lines, raw)
}

fn missing_variant(label: &str) -> String {
    format!("No {} variation", label.to_ascii_lowercase())
}

/// Strips a leading "<digits>." numbering token, e.g. "1. Formal: hi" -> "Formal: hi".
fn strip_numbering(line: &str) -> String {
    let trimmed = line.trim();
    let digits = trimmed.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        if let Some(rest) = trimmed[digits..].strip_prefix('.') {
            return rest.trim().to_string();
        }
    }
    trimmed.to_string()
}

/// Finds the first line carrying `<label>:` (case-insensitive) and returns
/// the trimmed remainder. A label token repeated back-to-back ("Formal:
/// Formal: hi") happens when the model echoes its own instruction; the
/// repetition is collapsed to a single occurrence.
fn extract_labeled(lines: &[String], label: &str) -> Option<String> {
    let needle = format!("{}:", label.to_ascii_lowercase());
    for line in lines {
        let Some(pos) = find_label(line, &needle) else {
            continue;
        };

        let mut value = line[pos + needle.len()..].trim();
        while value.to_ascii_lowercase().starts_with(&needle) {
            value = value[needle.len()..].trim();
        }

        if !value.is_empty() {
            return Some(value.to_string());
        }
    }
    None
}

/// Locates `needle` in `line`, case-insensitively, skipping occurrences that
/// sit inside a longer word ("Informal:" must not match the Formal label).
fn find_label(line: &str, needle: &str) -> Option<usize> {
    let lower = line.to_ascii_lowercase();
    let mut from = 0;
    while let Some(rel) = lower[from..].find(needle) {
        let pos = from + rel;
        let word_start = line[..pos]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphabetic());
        if word_start {
            return Some(pos);
        }
        from = pos + needle.len();
    }
    None
}

/// Zero labels matched: assign non-empty lines to the variants in order,
/// truncating past three and padding by repeating the last line (or the
/// whole reply when nothing survives the split).
fn positional(lines: &[String], raw: &str) -> Rephrased {
    let mut segments: Vec<&str> = lines
        .iter()
        .map(String::as_str)
        .filter(|line| !line.is_empty())
        .collect();

    segments.truncate(3);
    while segments.len() < 3 {
        let filler = segments.last().copied().unwrap_or_else(|| raw.trim());
        segments.push(filler);
    }

    Rephrased {
        formal: segments[0].to_string(),
        polite: segments[1].to_string(),
        casual: segments[2].to_string(),
    }
}
