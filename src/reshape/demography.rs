use std::fmt;

const TRAITS_HEADER: &str = "continuous\tid\tname";
const ANSWERS_HEADER: &str = "id\tname\ttrait_id";
const DEFAULTS_HEADER: &str = "max\tmin\ttrait_id";

/// Logical table inside a demography response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DemographyTable {
    Traits,
    Answers,
    Defaults,
    Unrecognized,
}

impl DemographyTable {
    pub const RECOGNIZED: [DemographyTable; 3] = [
        DemographyTable::Traits,
        DemographyTable::Answers,
        DemographyTable::Defaults,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DemographyTable::Traits => "traits",
            DemographyTable::Answers => "answers",
            DemographyTable::Defaults => "defaults",
            DemographyTable::Unrecognized => "unrecognized",
        }
    }
}

impl fmt::Display for DemographyTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identifies a sub-table by its header line.
pub fn classify_section(section: &str) -> DemographyTable {
    let header = section.lines().next().unwrap_or("");
    if header.contains(TRAITS_HEADER) {
        DemographyTable::Traits
    } else if header.contains(ANSWERS_HEADER) {
        DemographyTable::Answers
    } else if header.contains(DEFAULTS_HEADER) {
        DemographyTable::Defaults
    } else {
        DemographyTable::Unrecognized
    }
}

/// Splits a response into the sub-tables separated by blank lines.
pub fn split_sections(raw: &str) -> Vec<String> {
    let mut sections = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in raw.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                sections.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        sections.push(current.join("\n"));
    }

    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = "continuous\tid\tname\r\n0\t1\tGender\r\n1\t2\tAge\r\n\r\n\
        id\tname\ttrait_id\r\n10\tFemale\t1\r\n11\tMale\t1\r\n\r\n\
        max\tmin\ttrait_id\r\n99\t15\t2\r\n";

    #[test]
    fn test_split_sections() {
        let sections = split_sections(RESPONSE);
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0], "continuous\tid\tname\n0\t1\tGender\n1\t2\tAge");
        assert_eq!(sections[2], "max\tmin\ttrait_id\n99\t15\t2");
    }

    #[test]
    fn test_classification() {
        let kinds: Vec<DemographyTable> = split_sections(RESPONSE)
            .iter()
            .map(|s| classify_section(s))
            .collect();
        assert_eq!(
            kinds,
            vec![
                DemographyTable::Traits,
                DemographyTable::Answers,
                DemographyTable::Defaults
            ]
        );
        assert_eq!(classify_section("foo\tbar\n1\t2"), DemographyTable::Unrecognized);
        assert_eq!(classify_section(""), DemographyTable::Unrecognized);
    }

    #[test]
    fn test_classification_uses_header_line_only() {
        // a data row that happens to look like a header does not count
        let section = "code\tlabel\nid\tname\ttrait_id";
        assert_eq!(classify_section(section), DemographyTable::Unrecognized);
    }

    #[test]
    fn test_no_blank_lines_single_section() {
        assert_eq!(split_sections("a\tb\n1\t2\n").len(), 1);
        assert!(split_sections("\r\n\r\n").is_empty());
    }
}
