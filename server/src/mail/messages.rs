use rust_decimal::Decimal;

use super::OutgoingMail;
use crate::models::DeliveryKind;

pub fn format_euro(amount: Decimal) -> String {
    format!("{:.2} €", amount).replace('.', ",")
}

fn greeting(name: Option<&str>) -> String {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => format!("Hallo {name},"),
        None => "Hallo,".to_string(),
    }
}

fn pickup_lines(pickup_dates: &[String]) -> String {
    if pickup_dates.is_empty() {
        return "Die Abholtermine geben wir rechtzeitig bekannt.".to_string();
    }
    let mut text = String::from("Abholtermine:\n");
    for date in pickup_dates {
        text.push_str("  - ");
        text.push_str(date);
        text.push('\n');
    }
    text
}

pub fn magic_link(to: &str, link: &str, valid_minutes: u64) -> OutgoingMail {
    OutgoingMail {
        to: to.to_string(),
        subject: "Dein Anmeldelink für den Ticketshop".to_string(),
        body: format!(
            "Hallo,\n\nmit diesem Link meldest du dich im Ticketshop an:\n\n{link}\n\n\
             Der Link ist {valid_minutes} Minuten gültig und kann nur einmal verwendet werden.\n\
             Falls du keinen Link angefordert hast, kannst du diese E-Mail ignorieren.\n"
        ),
    }
}

pub struct ConfirmationDetails<'a> {
    pub name: Option<&'a str>,
    pub reserve_name: &'a str,
    pub quantity: i32,
    pub price_paid: Decimal,
    pub delivery_method: &'a str,
    pub kind: Option<DeliveryKind>,
    pub code: &'a str,
    pub pickup_dates: &'a [String],
}

pub fn purchase_confirmation(to: &str, details: &ConfirmationDetails<'_>) -> OutgoingMail {
    let delivery = match details.kind {
        Some(DeliveryKind::Shipping) => {
            "Wir schicken dir die Tickets per Post, sobald sie versandbereit sind.".to_string()
        }
        Some(DeliveryKind::Pickup) => format!(
            "Bitte bring zur Abholung deinen Code mit.\n{}",
            pickup_lines(details.pickup_dates)
        ),
        None => String::new(),
    };
    OutgoingMail {
        to: to.to_string(),
        subject: "Deine Ballkarten: Zahlung bestätigt".to_string(),
        body: format!(
            "{}\n\nvielen Dank für deinen Kauf!\n\n\
             Kontingent: {}\nAnzahl: {}\nBezahlt: {}\nLieferart: {}\nDein Code: {}\n\n{}\n",
            greeting(details.name),
            details.reserve_name,
            details.quantity,
            format_euro(details.price_paid),
            details.delivery_method,
            details.code,
            delivery
        ),
    }
}

pub fn shipping_notification(to: &str, name: Option<&str>, code: &str) -> OutgoingMail {
    OutgoingMail {
        to: to.to_string(),
        subject: "Deine Ballkarten sind unterwegs".to_string(),
        body: format!(
            "{}\n\ndeine Tickets wurden heute verschickt.\nSendungsreferenz: {code}\n",
            greeting(name)
        ),
    }
}

pub fn pickup_notification(
    to: &str,
    name: Option<&str>,
    code: &str,
    pickup_dates: &[String],
) -> OutgoingMail {
    OutgoingMail {
        to: to.to_string(),
        subject: "Deine Ballkarten liegen zur Abholung bereit".to_string(),
        body: format!(
            "{}\n\ndeine Tickets sind abholbereit. Bitte nenne bei der Abholung den Code {code}.\n\n{}",
            greeting(name),
            pickup_lines(pickup_dates)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_euro() {
        assert_eq!(format_euro(Decimal::new(3550, 2)), "35,50 €");
        assert_eq!(format_euro(Decimal::new(4, 0)), "4,00 €");
    }

    #[test]
    fn test_pickup_confirmation_lists_dates() {
        let dates = vec!["Fr 14.06. 16-18 Uhr".to_string()];
        let mail = purchase_confirmation(
            "anna@example.com",
            &ConfirmationDetails {
                name: Some("Anna"),
                reserve_name: "Hauptkontingent",
                quantity: 2,
                price_paid: Decimal::new(7000, 2),
                delivery_method: "Selbstabholung",
                kind: Some(DeliveryKind::Pickup),
                code: "K7M2PQ9X",
                pickup_dates: &dates,
            },
        );
        assert!(mail.body.starts_with("Hallo Anna,"));
        assert!(mail.body.contains("K7M2PQ9X"));
        assert!(mail.body.contains("70,00 €"));
        assert!(mail.body.contains("Fr 14.06. 16-18 Uhr"));
    }

    #[test]
    fn test_blank_name_falls_back() {
        let mail = shipping_notification("a@example.com", Some("  "), "ABC");
        assert!(mail.body.starts_with("Hallo,"));
    }
}
