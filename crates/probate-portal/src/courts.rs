//! Surrogate's Courts selectable on the file search form.

/// One entry of the `#CourtSelect` dropdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Court {
    /// Option value submitted by the form.
    pub id: &'static str,
    pub county: &'static str,
}

impl Court {
    /// Full court name as shown on the portal.
    pub fn name(&self) -> String {
        format!("{} County Surrogate's Court", self.county)
    }
}

const fn court(id: &'static str, county: &'static str) -> Court {
    Court { id, county }
}

/// All courts, in dropdown order. Ids are not contiguous.
pub const COURTS: &[Court] = &[
    court("1", "Albany"),
    court("2", "Allegany"),
    court("3", "Bronx"),
    court("4", "Broome"),
    court("5", "Cattaraugus"),
    court("6", "Cayuga"),
    court("7", "Chautauqua"),
    court("9", "Chenango"),
    court("10", "Clinton"),
    court("11", "Columbia"),
    court("12", "Cortland"),
    court("13", "Delaware"),
    court("14", "Dutchess"),
    court("15", "Erie"),
    court("16", "Essex"),
    court("17", "Franklin"),
    court("18", "Fulton"),
    court("19", "Genesee"),
    court("20", "Greene"),
    court("22", "Herkimer"),
    court("23", "Jefferson"),
    court("24", "Kings"),
    court("25", "Lewis"),
    court("26", "Livingston"),
    court("27", "Madison"),
    court("28", "Monroe"),
    court("29", "Montgomery"),
    court("30", "Nassau"),
    court("31", "New York"),
    court("32", "Niagara"),
    court("33", "Oneida"),
    court("34", "Onondaga"),
    court("35", "Ontario"),
    court("36", "Orange"),
    court("37", "Orleans"),
    court("38", "Oswego"),
    court("39", "Otsego"),
    court("40", "Putnam"),
    court("41", "Queens"),
    court("42", "Rensselaer"),
    court("43", "Richmond"),
    court("44", "Rockland"),
    court("45", "Saratoga"),
    court("46", "Schenectady"),
    court("47", "Schoharie"),
    court("48", "Schuyler"),
    court("49", "Seneca"),
    court("50", "St Lawrence"),
    court("51", "Steuben"),
    court("52", "Suffolk"),
    court("53", "Sullivan"),
    court("54", "Tioga"),
    court("55", "Tompkins"),
    court("56", "Ulster"),
    court("57", "Warren"),
    court("58", "Washington"),
    court("59", "Wayne"),
    court("60", "Westchester"),
    court("61", "Wyoming"),
    court("62", "Yates"),
];

pub fn by_id(id: &str) -> Option<&'static Court> {
    COURTS.iter().find(|c| c.id == id.trim())
}

/// Match a county ("kings") or a full court name, ignoring case.
pub fn by_name(name: &str) -> Option<&'static Court> {
    let wanted = name.trim().to_lowercase();
    COURTS.iter().find(|c| {
        c.county.to_lowercase() == wanted
            || c.name().to_lowercase() == wanted
            || format!("{} county", c.county.to_lowercase()) == wanted
    })
}

/// Resolve a user-supplied court: a selector id or a name.
pub fn resolve(input: &str) -> Option<&'static Court> {
    by_id(input).or_else(|| by_name(input))
}

#[cfg(test)]
mod tests {
    use super::*;
    use probate_core::config::PortalConfig;

    #[test]
    fn catalog_matches_portal_ids() {
        assert_eq!(COURTS.len(), 60);
        assert_eq!(by_id("1").unwrap().county, "Albany");
        assert_eq!(by_id("24").unwrap().county, "Kings");
        assert_eq!(by_id("62").unwrap().county, "Yates");
        // 8 and 21 are not used by the portal.
        assert!(by_id("8").is_none());
        assert!(by_id("21").is_none());
    }

    #[test]
    fn ids_are_unique() {
        for (i, a) in COURTS.iter().enumerate() {
            assert!(COURTS[i + 1..].iter().all(|b| b.id != a.id), "duplicate id {}", a.id);
        }
    }

    #[test]
    fn resolves_names_and_ids() {
        assert_eq!(resolve("24").unwrap().county, "Kings");
        assert_eq!(resolve("kings").unwrap().id, "24");
        assert_eq!(resolve("St Lawrence County").unwrap().id, "50");
        assert_eq!(
            resolve("New York County Surrogate's Court").unwrap().id,
            "31"
        );
        assert!(resolve("Atlantis").is_none());
    }

    #[test]
    fn default_court_is_kings() {
        assert_eq!(
            by_id(&PortalConfig::default().county_id).unwrap().name(),
            "Kings County Surrogate's Court"
        );
    }
}
