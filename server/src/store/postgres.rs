use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{Store, StoreResult};
use crate::models::{
    Buyer, BuyerGroup, BuyerOverview, ContactDetails, DeliveryMethod, NewBuyer, NewSoldTicket,
    ReserveInput, SoldTicket, StaffAccount, SystemSettings, TicketReserve, TicketType,
};
use crate::utils::error::AppError;

const BUYER_COLUMNS: &str = "id, email, name, phone, street, postal_code, city, country, \
     verified, group_id, max_tickets, created_at, updated_at";

const TICKET_COLUMNS: &str = "id, buyer_id, reserve_id, quantity, delivery_method, code, paid, \
     sent, payment_reference, checkout_session_id, price_paid, created_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn replace_reserve_methods(
        tx: &mut Transaction<'_, Postgres>,
        reserve_id: Uuid,
        method_ids: &[Uuid],
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM ticket_reserve_delivery_methods WHERE reserve_id = $1")
            .bind(reserve_id)
            .execute(&mut **tx)
            .await?;
        for method_id in method_ids {
            sqlx::query(
                "INSERT INTO ticket_reserve_delivery_methods (reserve_id, method_id) \
                 VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(reserve_id)
            .bind(method_id)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

fn buyer_query(filter: &str) -> String {
    format!("SELECT {BUYER_COLUMNS} FROM buyers WHERE {filter}")
}

fn ticket_query(filter: &str) -> String {
    format!("SELECT {TICKET_COLUMNS} FROM sold_tickets WHERE {filter}")
}

#[async_trait]
impl Store for PgStore {
    async fn settings(&self) -> StoreResult<SystemSettings> {
        let settings = sqlx::query_as::<_, SystemSettings>(
            "SELECT sales_enabled, updated_by, updated_at FROM system_settings WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        settings.ok_or_else(|| {
            AppError::InternalServerError("Systemeinstellungen fehlen.".to_string())
        })
    }

    async fn set_sales_enabled(
        &self,
        enabled: bool,
        updated_by: &str,
    ) -> StoreResult<SystemSettings> {
        let settings = sqlx::query_as::<_, SystemSettings>(
            "INSERT INTO system_settings (id, sales_enabled, updated_by, updated_at) \
             VALUES (1, $1, $2, NOW()) \
             ON CONFLICT (id) DO UPDATE SET sales_enabled = EXCLUDED.sales_enabled, \
             updated_by = EXCLUDED.updated_by, updated_at = EXCLUDED.updated_at \
             RETURNING sales_enabled, updated_by, updated_at",
        )
        .bind(enabled)
        .bind(updated_by)
        .fetch_one(&self.pool)
        .await?;
        Ok(settings)
    }

    async fn list_buyer_groups(&self) -> StoreResult<Vec<BuyerGroup>> {
        let groups = sqlx::query_as::<_, BuyerGroup>(
            "SELECT id, name, max_tickets, updated_by, updated_at FROM buyer_groups ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(groups)
    }

    async fn find_buyer_group(&self, id: Uuid) -> StoreResult<Option<BuyerGroup>> {
        let group = sqlx::query_as::<_, BuyerGroup>(
            "SELECT id, name, max_tickets, updated_by, updated_at FROM buyer_groups WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(group)
    }

    async fn find_buyer_group_by_name(&self, name: &str) -> StoreResult<Option<BuyerGroup>> {
        let group = sqlx::query_as::<_, BuyerGroup>(
            "SELECT id, name, max_tickets, updated_by, updated_at FROM buyer_groups WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(group)
    }

    async fn update_buyer_group_max(
        &self,
        id: Uuid,
        max_tickets: i32,
        updated_by: &str,
    ) -> StoreResult<Option<BuyerGroup>> {
        let group = sqlx::query_as::<_, BuyerGroup>(
            "UPDATE buyer_groups SET max_tickets = $2, updated_by = $3, updated_at = NOW() \
             WHERE id = $1 RETURNING id, name, max_tickets, updated_by, updated_at",
        )
        .bind(id)
        .bind(max_tickets)
        .bind(updated_by)
        .fetch_optional(&self.pool)
        .await?;
        Ok(group)
    }

    async fn list_ticket_types(&self) -> StoreResult<Vec<TicketType>> {
        let types = sqlx::query_as::<_, TicketType>("SELECT id, name FROM ticket_types ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(types)
    }

    async fn find_ticket_type(&self, id: Uuid) -> StoreResult<Option<TicketType>> {
        let ticket_type =
            sqlx::query_as::<_, TicketType>("SELECT id, name FROM ticket_types WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(ticket_type)
    }

    async fn group_ticket_type_ids(&self, group_id: Uuid) -> StoreResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT type_id FROM buyer_group_ticket_types WHERE group_id = $1",
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn find_buyer(&self, id: Uuid) -> StoreResult<Option<Buyer>> {
        let buyer = sqlx::query_as::<_, Buyer>(&buyer_query("id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(buyer)
    }

    async fn find_buyer_by_email(&self, email: &str) -> StoreResult<Option<Buyer>> {
        let buyer = sqlx::query_as::<_, Buyer>(&buyer_query("email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(buyer)
    }

    async fn insert_buyer(&self, buyer: NewBuyer) -> StoreResult<Buyer> {
        let sql = format!(
            "INSERT INTO buyers (id, email, name, group_id, verified) VALUES ($1, $2, $3, $4, $5) \
             RETURNING {BUYER_COLUMNS}"
        );
        let buyer = sqlx::query_as::<_, Buyer>(&sql)
            .bind(Uuid::new_v4())
            .bind(&buyer.email)
            .bind(&buyer.name)
            .bind(buyer.group_id)
            .bind(buyer.verified)
            .fetch_one(&self.pool)
            .await?;
        Ok(buyer)
    }

    async fn set_buyer_verified(&self, id: Uuid) -> StoreResult<Buyer> {
        let sql = format!(
            "UPDATE buyers SET verified = TRUE, updated_at = NOW() WHERE id = $1 \
             RETURNING {BUYER_COLUMNS}"
        );
        let buyer = sqlx::query_as::<_, Buyer>(&sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(buyer)
    }

    async fn update_buyer_contact(
        &self,
        id: Uuid,
        contact: &ContactDetails,
    ) -> StoreResult<Buyer> {
        let sql = format!(
            "UPDATE buyers SET name = $2, phone = $3, street = $4, postal_code = $5, city = $6, \
             country = $7, updated_at = NOW() WHERE id = $1 RETURNING {BUYER_COLUMNS}"
        );
        let buyer = sqlx::query_as::<_, Buyer>(&sql)
            .bind(id)
            .bind(&contact.name)
            .bind(&contact.phone)
            .bind(&contact.street)
            .bind(&contact.postal_code)
            .bind(&contact.city)
            .bind(&contact.country)
            .fetch_one(&self.pool)
            .await?;
        Ok(buyer)
    }

    async fn update_buyer_group_and_name(
        &self,
        id: Uuid,
        group_id: Uuid,
        name: &str,
    ) -> StoreResult<Buyer> {
        let sql = format!(
            "UPDATE buyers SET group_id = $2, name = $3, updated_at = NOW() WHERE id = $1 \
             RETURNING {BUYER_COLUMNS}"
        );
        let buyer = sqlx::query_as::<_, Buyer>(&sql)
            .bind(id)
            .bind(group_id)
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(buyer)
    }

    async fn set_buyer_max_tickets(
        &self,
        id: Uuid,
        max_tickets: Option<i32>,
    ) -> StoreResult<Option<Buyer>> {
        let sql = format!(
            "UPDATE buyers SET max_tickets = $2, updated_at = NOW() WHERE id = $1 \
             RETURNING {BUYER_COLUMNS}"
        );
        let buyer = sqlx::query_as::<_, Buyer>(&sql)
            .bind(id)
            .bind(max_tickets)
            .fetch_optional(&self.pool)
            .await?;
        Ok(buyer)
    }

    async fn list_buyers(&self) -> StoreResult<Vec<BuyerOverview>> {
        let buyers = sqlx::query_as::<_, BuyerOverview>(
            "SELECT b.id, b.email, b.name, b.verified, g.name AS group_name, b.max_tickets, \
             (SELECT COUNT(*) FROM sold_tickets t WHERE t.buyer_id = b.id) AS ticket_count \
             FROM buyers b JOIN buyer_groups g ON g.id = b.group_id ORDER BY b.email",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(buyers)
    }

    async fn insert_verification_token(
        &self,
        identifier: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO verification_tokens (identifier, token_hash, expires_at) VALUES ($1, $2, $3)",
        )
        .bind(identifier)
        .bind(token_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn take_verification_token(
        &self,
        identifier: &str,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let expires_at = sqlx::query_scalar::<_, DateTime<Utc>>(
            "DELETE FROM verification_tokens WHERE identifier = $1 AND token_hash = $2 \
             RETURNING expires_at",
        )
        .bind(identifier)
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        sqlx::query("DELETE FROM verification_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(expires_at.is_some_and(|expires_at| expires_at > now))
    }

    async fn find_staff_account(&self, username: &str) -> StoreResult<Option<StaffAccount>> {
        let account = sqlx::query_as::<_, StaffAccount>(
            "SELECT u.id, u.username, u.password_hash, g.name AS group_name \
             FROM backend_users u JOIN backend_groups g ON g.id = u.group_id \
             WHERE u.username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(account)
    }

    async fn insert_staff_account(
        &self,
        username: &str,
        password_hash: &str,
        group_name: &str,
    ) -> StoreResult<StaffAccount> {
        let account = sqlx::query_as::<_, StaffAccount>(
            "WITH inserted AS ( \
                 INSERT INTO backend_users (id, username, password_hash, group_id) \
                 SELECT $1, $2, $3, id FROM backend_groups WHERE name = $4 \
                 RETURNING id, username, password_hash, group_id) \
             SELECT i.id, i.username, i.password_hash, g.name AS group_name \
             FROM inserted i JOIN backend_groups g ON g.id = i.group_id",
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(password_hash)
        .bind(group_name)
        .fetch_optional(&self.pool)
        .await?;
        account.ok_or_else(|| AppError::NotFound(format!("Gruppe '{group_name}' existiert nicht.")))
    }

    async fn list_delivery_methods(&self) -> StoreResult<Vec<DeliveryMethod>> {
        let methods = sqlx::query_as::<_, DeliveryMethod>(
            "SELECT id, name, surcharge, updated_by, updated_at FROM delivery_methods ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(methods)
    }

    async fn update_delivery_surcharge(
        &self,
        id: Uuid,
        surcharge: Decimal,
        updated_by: &str,
    ) -> StoreResult<Option<DeliveryMethod>> {
        let method = sqlx::query_as::<_, DeliveryMethod>(
            "UPDATE delivery_methods SET surcharge = $2, updated_by = $3, updated_at = NOW() \
             WHERE id = $1 RETURNING id, name, surcharge, updated_by, updated_at",
        )
        .bind(id)
        .bind(surcharge)
        .bind(updated_by)
        .fetch_optional(&self.pool)
        .await?;
        Ok(method)
    }

    async fn list_reserves(&self) -> StoreResult<Vec<TicketReserve>> {
        let reserves = sqlx::query_as::<_, TicketReserve>(
            "SELECT id, name, amount, price, type_id, updated_by, updated_at \
             FROM ticket_reserves ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(reserves)
    }

    async fn find_reserve(&self, id: Uuid) -> StoreResult<Option<TicketReserve>> {
        let reserve = sqlx::query_as::<_, TicketReserve>(
            "SELECT id, name, amount, price, type_id, updated_by, updated_at \
             FROM ticket_reserves WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(reserve)
    }

    async fn reserve_delivery_methods(
        &self,
        reserve_id: Uuid,
    ) -> StoreResult<Vec<DeliveryMethod>> {
        let methods = sqlx::query_as::<_, DeliveryMethod>(
            "SELECT m.id, m.name, m.surcharge, m.updated_by, m.updated_at \
             FROM delivery_methods m \
             JOIN ticket_reserve_delivery_methods rm ON rm.method_id = m.id \
             WHERE rm.reserve_id = $1 ORDER BY m.name",
        )
        .bind(reserve_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(methods)
    }

    async fn sold_units(&self, reserve_id: Uuid) -> StoreResult<i64> {
        let sold = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(quantity), 0)::BIGINT FROM sold_tickets \
             WHERE reserve_id = $1 AND paid",
        )
        .bind(reserve_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(sold)
    }

    async fn insert_reserve(
        &self,
        input: &ReserveInput,
        updated_by: &str,
    ) -> StoreResult<TicketReserve> {
        let mut tx = self.pool.begin().await?;
        let reserve = sqlx::query_as::<_, TicketReserve>(
            "INSERT INTO ticket_reserves (id, name, amount, price, type_id, updated_by, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, NOW()) \
             RETURNING id, name, amount, price, type_id, updated_by, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(&input.name)
        .bind(input.amount)
        .bind(input.price)
        .bind(input.type_id)
        .bind(updated_by)
        .fetch_one(&mut *tx)
        .await?;
        Self::replace_reserve_methods(&mut tx, reserve.id, &input.delivery_method_ids).await?;
        tx.commit().await?;
        Ok(reserve)
    }

    async fn update_reserve(
        &self,
        id: Uuid,
        input: &ReserveInput,
        updated_by: &str,
    ) -> StoreResult<Option<TicketReserve>> {
        let mut tx = self.pool.begin().await?;
        let reserve = sqlx::query_as::<_, TicketReserve>(
            "UPDATE ticket_reserves SET name = $2, amount = $3, price = $4, type_id = $5, \
             updated_by = $6, updated_at = NOW() WHERE id = $1 \
             RETURNING id, name, amount, price, type_id, updated_by, updated_at",
        )
        .bind(id)
        .bind(&input.name)
        .bind(input.amount)
        .bind(input.price)
        .bind(input.type_id)
        .bind(updated_by)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(reserve) = reserve else {
            return Ok(None);
        };
        Self::replace_reserve_methods(&mut tx, reserve.id, &input.delivery_method_ids).await?;
        tx.commit().await?;
        Ok(Some(reserve))
    }

    async fn code_exists(&self, code: &str) -> StoreResult<bool> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM sold_tickets WHERE code = $1)")
                .bind(code)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn count_tickets_for_buyer(&self, buyer_id: Uuid) -> StoreResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM sold_tickets WHERE buyer_id = $1",
        )
        .bind(buyer_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn insert_sold_ticket(&self, ticket: NewSoldTicket) -> StoreResult<SoldTicket> {
        let sql = format!(
            "INSERT INTO sold_tickets (id, buyer_id, reserve_id, quantity, delivery_method, code, \
             paid, sent, price_paid, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, FALSE, FALSE, $7, NOW()) RETURNING {TICKET_COLUMNS}"
        );
        let ticket = sqlx::query_as::<_, SoldTicket>(&sql)
            .bind(Uuid::new_v4())
            .bind(ticket.buyer_id)
            .bind(ticket.reserve_id)
            .bind(ticket.quantity)
            .bind(&ticket.delivery_method)
            .bind(&ticket.code)
            .bind(ticket.price_paid)
            .fetch_one(&self.pool)
            .await?;
        Ok(ticket)
    }

    async fn set_checkout_session(&self, ticket_id: Uuid, session_id: &str) -> StoreResult<()> {
        sqlx::query("UPDATE sold_tickets SET checkout_session_id = $2 WHERE id = $1")
            .bind(ticket_id)
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_sold_ticket(&self, ticket_id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM sold_tickets WHERE id = $1 AND NOT paid")
            .bind(ticket_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_sold_ticket(&self, id: Uuid) -> StoreResult<Option<SoldTicket>> {
        let ticket = sqlx::query_as::<_, SoldTicket>(&ticket_query("id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(ticket)
    }

    async fn find_ticket_by_code(&self, code: &str) -> StoreResult<Option<SoldTicket>> {
        let ticket = sqlx::query_as::<_, SoldTicket>(&ticket_query("code = $1"))
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(ticket)
    }

    async fn tickets_for_buyer(&self, buyer_id: Uuid) -> StoreResult<Vec<SoldTicket>> {
        let tickets = sqlx::query_as::<_, SoldTicket>(&format!(
            "{} ORDER BY created_at",
            ticket_query("buyer_id = $1")
        ))
        .bind(buyer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tickets)
    }

    async fn list_sold_tickets(&self) -> StoreResult<Vec<SoldTicket>> {
        let tickets = sqlx::query_as::<_, SoldTicket>(&format!(
            "SELECT {TICKET_COLUMNS} FROM sold_tickets ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(tickets)
    }

    async fn mark_ticket_paid(
        &self,
        ticket_id: Uuid,
        payment_reference: &str,
    ) -> StoreResult<Option<SoldTicket>> {
        // The NOT paid guard makes a concurrent second confirmation a no-op.
        let sql = format!(
            "UPDATE sold_tickets SET paid = TRUE, payment_reference = $2 \
             WHERE id = $1 AND NOT paid RETURNING {TICKET_COLUMNS}"
        );
        let ticket = sqlx::query_as::<_, SoldTicket>(&sql)
            .bind(ticket_id)
            .bind(payment_reference)
            .fetch_optional(&self.pool)
            .await?;
        Ok(ticket)
    }

    async fn mark_ticket_sent(&self, ticket_id: Uuid) -> StoreResult<Option<SoldTicket>> {
        let sql = format!(
            "UPDATE sold_tickets SET sent = TRUE WHERE id = $1 RETURNING {TICKET_COLUMNS}"
        );
        let ticket = sqlx::query_as::<_, SoldTicket>(&sql)
            .bind(ticket_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(ticket)
    }
}
