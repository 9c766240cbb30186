//! Bill DTOs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use core_kernel::{BillId, BillingPeriod, Currency, FeeId, FeeTypeId, Money, RateConfigId, RoomId, Timezone, UserId};
use domain_billing::meter::MAX_METER_CAPACITY;
use domain_billing::{Bill, BillCalculation, BillReadings, Fee, MeterPair, MutationOutcome, PaymentState};

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Validate)]
pub struct MeterReadingDto {
    pub old_reading: u64,
    pub new_reading: u64,
    #[validate(range(min = 1, max = MAX_METER_CAPACITY))]
    pub max_capacity: u64,
}

impl From<MeterReadingDto> for MeterPair {
    fn from(dto: MeterReadingDto) -> Self {
        MeterPair::new(dto.old_reading, dto.new_reading, dto.max_capacity)
    }
}

impl From<&MeterPair> for MeterReadingDto {
    fn from(pair: &MeterPair) -> Self {
        Self {
            old_reading: pair.old_reading,
            new_reading: pair.new_reading,
            max_capacity: pair.max_capacity,
        }
    }
}

/// Electricity readings plus water readings when water is metered
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ReadingsDto {
    pub electricity: MeterReadingDto,
    #[serde(default)]
    pub water: Option<MeterReadingDto>,
}

impl ReadingsDto {
    pub fn validate_all(&self) -> Result<(), ApiError> {
        self.electricity.validate()?;
        if let Some(water) = &self.water {
            water.validate()?;
        }
        Ok(())
    }
}

impl From<ReadingsDto> for BillReadings {
    fn from(dto: ReadingsDto) -> Self {
        BillReadings {
            electricity: dto.electricity.into(),
            water: dto.water.map(Into::into),
        }
    }
}

/// A fee in the configured currency; typed when `fee_type_id` is set
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct FeeDto {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub amount: Decimal,
    #[serde(default)]
    pub fee_type_id: Option<Uuid>,
}

impl FeeDto {
    pub fn into_fee(self, currency: Currency) -> Fee {
        let amount = Money::new(self.amount, currency);
        match self.fee_type_id {
            Some(type_id) => Fee::typed(self.name, amount, FeeTypeId::from_uuid(type_id)),
            None => Fee::ad_hoc(self.name, amount),
        }
    }
}

/// Validates and converts request fees
pub fn convert_fees(fees: Vec<FeeDto>, currency: Currency) -> Result<Vec<Fee>, ApiError> {
    fees.into_iter()
        .map(|fee| -> Result<Fee, ApiError> {
            fee.validate()?;
            Ok(fee.into_fee(currency))
        })
        .collect()
}

#[derive(Debug, Deserialize)]
pub struct PreviewBillRequest {
    pub room_id: Uuid,
    pub readings: ReadingsDto,
    #[serde(default)]
    pub fees: Vec<FeeDto>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBillRequest {
    pub room_id: Uuid,
    /// Defaults, together with `year`, to the current month
    #[validate(range(min = 1, max = 12))]
    pub month: Option<u32>,
    #[validate(range(min = 2000, max = 2100))]
    pub year: Option<i32>,
    pub readings: ReadingsDto,
    #[serde(default)]
    pub fees: Vec<FeeDto>,
}

impl CreateBillRequest {
    pub fn period(&self, tz: Timezone) -> Result<BillingPeriod, ApiError> {
        match (self.month, self.year) {
            (Some(month), Some(year)) => {
                BillingPeriod::new(month, year).map_err(|e| ApiError::validation(e.to_string()))
            }
            (None, None) => Ok(BillingPeriod::current(tz)),
            _ => Err(ApiError::validation("month and year must be given together")),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct SetPaidRequest {
    pub is_paid: bool,
}

#[derive(Debug, Serialize)]
pub struct MeterResponse {
    #[serde(flatten)]
    pub readings: MeterReadingDto,
    pub usage: u64,
    pub rollover: bool,
}

#[derive(Debug, Serialize)]
pub struct FeeResponse {
    pub id: FeeId,
    pub name: String,
    pub amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_type_id: Option<FeeTypeId>,
}

impl From<&Fee> for FeeResponse {
    fn from(fee: &Fee) -> Self {
        Self {
            id: fee.id(),
            name: fee.name().to_string(),
            amount: fee.amount().amount(),
            fee_type_id: fee.fee_type_id(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CalculationResponse {
    pub electricity_usage: u64,
    pub electricity_rollover: bool,
    pub electricity_cost: Decimal,
    pub water_usage: Option<u64>,
    pub water_rollover: Option<bool>,
    pub water_cost: Decimal,
    pub fees_total: Decimal,
    pub total_cost: Decimal,
    pub total_cost_text: String,
    pub currency: Currency,
}

impl From<&BillCalculation> for CalculationResponse {
    fn from(calc: &BillCalculation) -> Self {
        Self {
            electricity_usage: calc.electricity_usage,
            electricity_rollover: calc.electricity_rollover,
            electricity_cost: calc.electricity_cost.amount(),
            water_usage: calc.water_usage,
            water_rollover: calc.water_rollover,
            water_cost: calc.water_cost.amount(),
            fees_total: calc.fees_total.amount(),
            total_cost: calc.total_cost.amount(),
            total_cost_text: calc.total_cost_text.clone(),
            currency: calc.total_cost.currency(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BillResponse {
    pub id: BillId,
    pub room_id: RoomId,
    pub owner_id: UserId,
    pub month: u32,
    pub year: i32,
    pub electricity: MeterResponse,
    pub water: Option<MeterResponse>,
    pub occupant_count: u32,
    pub rate_config_id: RateConfigId,
    pub fees: Vec<FeeResponse>,
    #[serde(flatten)]
    pub calculation: CalculationResponse,
    pub paid_amount: Option<Decimal>,
    pub is_paid: bool,
    pub payment_state: PaymentState,
    pub shortfall: Decimal,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Bill> for BillResponse {
    fn from(bill: &Bill) -> Self {
        let calc = bill.calculation();
        let readings = bill.readings();
        let water = match (&readings.water, calc.water_usage, calc.water_rollover) {
            (Some(pair), Some(usage), Some(rollover)) => Some(MeterResponse {
                readings: pair.into(),
                usage,
                rollover,
            }),
            _ => None,
        };

        Self {
            id: bill.id(),
            room_id: bill.room_id(),
            owner_id: bill.owner_id(),
            month: bill.period().month(),
            year: bill.period().year(),
            electricity: MeterResponse {
                readings: (&readings.electricity).into(),
                usage: calc.electricity_usage,
                rollover: calc.electricity_rollover,
            },
            water,
            occupant_count: bill.occupant_count().get(),
            rate_config_id: bill.rate_config_id(),
            fees: bill.fees().iter().map(FeeResponse::from).collect(),
            calculation: calc.into(),
            paid_amount: bill.paid_amount().map(|p| p.amount()),
            is_paid: bill.is_paid(),
            payment_state: bill.payment_state(),
            shortfall: bill.shortfall().amount(),
            version: bill.version(),
            created_at: bill.created_at(),
            updated_at: bill.updated_at(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeletedBill {
    pub id: BillId,
}

/// Mutation result with the outcome of its audit write
#[derive(Debug, Serialize)]
pub struct MutationResponse<T> {
    pub data: T,
    pub audit_recorded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_error: Option<String>,
}

impl MutationResponse<BillResponse> {
    pub fn bill(outcome: MutationOutcome<Bill>) -> Self {
        Self {
            data: BillResponse::from(&outcome.value),
            audit_recorded: outcome.history.is_some(),
            audit_error: outcome.audit_error,
        }
    }
}

impl MutationResponse<DeletedBill> {
    pub fn deleted(outcome: MutationOutcome<BillId>) -> Self {
        Self {
            data: DeletedBill { id: outcome.value },
            audit_recorded: outcome.history.is_some(),
            audit_error: outcome.audit_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(month: Option<u32>, year: Option<i32>) -> CreateBillRequest {
        CreateBillRequest {
            room_id: Uuid::new_v4(),
            month,
            year,
            readings: ReadingsDto {
                electricity: MeterReadingDto {
                    old_reading: 0,
                    new_reading: 10,
                    max_capacity: 99_999,
                },
                water: None,
            },
            fees: vec![],
        }
    }

    #[test]
    fn test_period_defaults_to_current_month() {
        let tz = Timezone::default();
        assert_eq!(request(None, None).period(tz).unwrap(), BillingPeriod::current(tz));
        assert_eq!(
            request(Some(2), Some(2024)).period(tz).unwrap(),
            BillingPeriod::new(2, 2024).unwrap()
        );
        assert!(request(Some(2), None).period(tz).is_err());
    }

    #[test]
    fn test_month_out_of_range_fails_validation() {
        assert!(request(Some(13), Some(2024)).validate().is_err());
        assert!(request(Some(12), Some(2024)).validate().is_ok());
    }

    #[test]
    fn test_fee_with_type_becomes_typed_fee() {
        let dto: FeeDto = serde_json::from_value(json!({
            "name": "Parking",
            "amount": "100000",
            "fee_type_id": Uuid::new_v4(),
        }))
        .unwrap();
        let fee = dto.into_fee(Currency::VND);
        assert!(fee.fee_type_id().is_some());
        assert_eq!(fee.amount().amount(), Decimal::from(100_000));
    }

    #[test]
    fn test_blank_fee_name_is_rejected() {
        let fees = vec![FeeDto {
            name: String::new(),
            amount: Decimal::from(1),
            fee_type_id: None,
        }];
        assert!(matches!(
            convert_fees(fees, Currency::VND),
            Err(ApiError::Validation { .. })
        ));
    }

    #[test]
    fn test_water_is_optional_in_readings() {
        let dto: ReadingsDto = serde_json::from_value(json!({
            "electricity": { "old_reading": 1000, "new_reading": 1120, "max_capacity": 99999 }
        }))
        .unwrap();
        let readings = BillReadings::from(dto);
        assert!(readings.water.is_none());
        assert_eq!(readings.electricity.new_reading, 1120);
    }

    #[test]
    fn test_capacity_beyond_signed_range_fails_validation() {
        let dto: ReadingsDto = serde_json::from_value(json!({
            "electricity": { "old_reading": 0, "new_reading": 10, "max_capacity": u64::MAX }
        }))
        .unwrap();
        assert!(matches!(dto.validate_all(), Err(ApiError::Validation { .. })));

        let at_limit: ReadingsDto = serde_json::from_value(json!({
            "electricity": { "old_reading": 0, "new_reading": 10, "max_capacity": i64::MAX }
        }))
        .unwrap();
        assert!(at_limit.validate_all().is_ok());
    }
}
