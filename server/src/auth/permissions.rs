use serde::Serialize;

/// Admin areas a staff group can be granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Section {
    Contingents,
    DeliveryMethods,
    BuyerGroups,
    Buyers,
    Tickets,
    Import,
    Settings,
}

pub const ADMIN_GROUP: &str = "Admin";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Permissions {
    pub contingents: bool,
    pub delivery_methods: bool,
    pub buyer_groups: bool,
    pub buyers: bool,
    pub tickets: bool,
    pub import: bool,
    pub settings: bool,
}

impl Permissions {
    const ALL: Permissions = Permissions {
        contingents: true,
        delivery_methods: true,
        buyer_groups: true,
        buyers: true,
        tickets: true,
        import: true,
        settings: true,
    };

    pub fn allows(&self, section: Section) -> bool {
        match section {
            Section::Contingents => self.contingents,
            Section::DeliveryMethods => self.delivery_methods,
            Section::BuyerGroups => self.buyer_groups,
            Section::Buyers => self.buyers,
            Section::Tickets => self.tickets,
            Section::Import => self.import,
            Section::Settings => self.settings,
        }
    }
}

const GROUP_PERMISSIONS: &[(&str, Permissions)] = &[
    (
        "Orga",
        Permissions {
            contingents: true,
            delivery_methods: true,
            buyer_groups: true,
            buyers: true,
            tickets: false,
            import: true,
            settings: false,
        },
    ),
    (
        "Kasse",
        Permissions {
            contingents: false,
            delivery_methods: false,
            buyer_groups: false,
            buyers: true,
            tickets: true,
            import: false,
            settings: false,
        },
    ),
    (
        "Versand",
        Permissions {
            contingents: false,
            delivery_methods: false,
            buyer_groups: false,
            buyers: false,
            tickets: true,
            import: false,
            settings: false,
        },
    ),
];

/// Unknown groups get nothing; `Admin` gets everything.
pub fn permissions_for(group: &str) -> Permissions {
    if group == ADMIN_GROUP {
        return Permissions::ALL;
    }
    GROUP_PERMISSIONS
        .iter()
        .find(|(name, _)| *name == group)
        .map(|(_, permissions)| *permissions)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_bypasses_everything() {
        let admin = permissions_for("Admin");
        for section in [
            Section::Contingents,
            Section::DeliveryMethods,
            Section::BuyerGroups,
            Section::Buyers,
            Section::Tickets,
            Section::Import,
            Section::Settings,
        ] {
            assert!(admin.allows(section));
        }
    }

    #[test]
    fn test_group_table() {
        assert!(permissions_for("Kasse").allows(Section::Tickets));
        assert!(!permissions_for("Kasse").allows(Section::Import));
        assert!(permissions_for("Orga").allows(Section::Import));
        assert!(!permissions_for("Orga").allows(Section::Settings));
        assert!(!permissions_for("Versand").allows(Section::Buyers));
    }

    #[test]
    fn test_unknown_group_has_no_access() {
        assert_eq!(permissions_for("admin"), Permissions::default());
        assert_eq!(permissions_for(""), Permissions::default());
    }
}
