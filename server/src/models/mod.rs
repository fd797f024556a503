pub mod backend_user;
pub mod buyer;
pub mod buyer_group;
pub mod delivery_method;
pub mod sold_ticket;
pub mod system_settings;
pub mod ticket_reserve;

pub use backend_user::StaffAccount;
pub use buyer::{Buyer, BuyerOverview, ContactDetails, NewBuyer};
pub use buyer_group::{BuyerGroup, ALUMNI_GROUP, PUBLIC_GROUP};
pub use delivery_method::{DeliveryKind, DeliveryMethod};
pub use sold_ticket::{NewSoldTicket, SoldTicket};
pub use system_settings::SystemSettings;
pub use ticket_reserve::{ReserveInput, TicketReserve, TicketType};
