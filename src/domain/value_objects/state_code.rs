//! GSTIN state codes

pub const UNKNOWN_STATE_CODE: &str = "99";

const STATE_CODES: &[(&str, &str)] = &[
    ("Jammu and Kashmir", "01"),
    ("Himachal Pradesh", "02"),
    ("Punjab", "03"),
    ("Chandigarh", "04"),
    ("Uttarakhand", "05"),
    ("Haryana", "06"),
    ("Delhi", "07"),
    ("Rajasthan", "08"),
    ("Uttar Pradesh", "09"),
    ("Bihar", "10"),
    ("Sikkim", "11"),
    ("Arunachal Pradesh", "12"),
    ("Nagaland", "13"),
    ("Manipur", "14"),
    ("Mizoram", "15"),
    ("Tripura", "16"),
    ("Meghalaya", "17"),
    ("Assam", "18"),
    ("West Bengal", "19"),
    ("Jharkhand", "20"),
    ("Odisha", "21"),
    ("Chhattisgarh", "22"),
    ("Madhya Pradesh", "23"),
    ("Gujarat", "24"),
    ("Dadra and Nagar Haveli and Daman and Diu", "26"),
    ("Maharashtra", "27"),
    ("Karnataka", "29"),
    ("Goa", "30"),
    ("Lakshadweep", "31"),
    ("Kerala", "32"),
    ("Tamil Nadu", "33"),
    ("Puducherry", "34"),
    ("Andaman and Nicobar Islands", "35"),
    ("Telangana", "36"),
    ("Andhra Pradesh", "37"),
    ("Ladakh", "38"),
];

/// Two-digit GSTIN code for a state name. Matching ignores case and
/// surrounding whitespace.
pub fn state_code(state: &str) -> &'static str {
    let state = state.trim();
    STATE_CODES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(state))
        .map(|(_, code)| *code)
        .unwrap_or(UNKNOWN_STATE_CODE)
}

pub fn state_name(code: &str) -> Option<&'static str> {
    STATE_CODES.iter().find(|(_, c)| *c == code).map(|(name, _)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_states_resolve() {
        assert_eq!(state_code("Maharashtra"), "27");
        assert_eq!(state_code("  delhi "), "07");
        assert_eq!(state_code("Ladakh"), "38");
    }

    #[test]
    fn unknown_state_falls_back() {
        assert_eq!(state_code("Atlantis"), UNKNOWN_STATE_CODE);
        assert_eq!(state_code(""), UNKNOWN_STATE_CODE);
    }

    #[test]
    fn codes_are_unique() {
        let mut codes: Vec<_> = STATE_CODES.iter().map(|(_, c)| *c).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), STATE_CODES.len());
        assert_eq!(state_name("29"), Some("Karnataka"));
    }
}
