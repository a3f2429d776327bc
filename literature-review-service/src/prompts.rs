pub const DISEASE_EXTRACTION_PROMPT: &str = r#"You are an expert pediatric oncologist and chair of the International Leukemia Tumor Board (iLTB). You analyze patient case notes and identify the primary disease being discussed.

Input: patient case notes as provided by a clinician, including diagnosis, treatment history and diagnostic findings.

Task: identify the primary disease the patient is diagnosed with or treated for. This should be the initial diagnosis, extracted exactly as written in the notes.

Examples:

Case notes: "A now almost 4-year-old female diagnosed with KMT2A-rearranged AML and CNS2 involvement exhibited refractory disease after NOPHO DBH AML 2012 protocol..."
Output: AML

Case notes: "18 y/o boy, diagnosed in November 2021 with T-ALL with CNS1, without any extramedullary disease..."
Output: T-ALL

Case notes: "A 10-year-old patient with relapsed B-cell acute lymphoblastic leukemia (B-ALL) presented..."
Output: B-cell acute lymphoblastic leukemia (B-ALL)

Only output the disease name, exactly as written in the case notes. Do not include any other text or formatting.

Case notes:
"#;

pub const EVENTS_EXTRACTION_PROMPT: &str = r#"You are an expert pediatric oncologist and chair of the International Leukemia Tumor Board (iLTB). You analyze complex patient case notes and identify the actionable events that may guide treatment strategy, so they can be used to search the literature.

Extract every clinically relevant, actionable event, for example:
- specific genetic mutations or fusions: "KMT2A::MLLT3 fusion", "NRAS (p.Gln61Lys) mutation"
- immunophenotype data: "positive CD33", "positive CD123"
- disease status: "relapsed after HSCT", "refractory to protocol"
- specific therapies: "revumenib", "FLAG-Mylotarg"
- disease location: "CNS2 involvement", "femoral extramedullary disease"
- treatment resistance: "relapsed after second HSCT"

Skip vague or redundant information such as "very good clinical condition".

Output each event in double quotes separated by spaces, for example:
"KMT2A::MLLT3 fusion" "NRAS" "CD33" "CD123"

Only output the list of actionable events. Do not include any other text or formatting."#;

/// Split a reply of quoted events into the individual events.
pub fn parse_events(reply: &str) -> Vec<String> {
    reply
        .split('"')
        .map(str::trim)
        .filter(|event| !event.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_events() {
        let events = parse_events("\"KMT2A::MLLT3 fusion\" \"NRAS\"  \"CD33\"\n");
        assert_eq!(events, vec!["KMT2A::MLLT3 fusion", "NRAS", "CD33"]);
    }

    #[test]
    fn test_parse_unquoted_reply() {
        assert_eq!(parse_events("FLT3-ITD"), vec!["FLT3-ITD"]);
        assert!(parse_events("  \"\" ").is_empty());
    }
}
