//! Pure financial math: amortisation schedules, IRR, bond pricing/duration,
//! and Black-Scholes option pricing. No I/O, no knowledge of the tool
//! registry — each function takes validated numeric input and returns a
//! number or a small result struct.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum FinanceError {
    #[error("principal must be positive")]
    InvalidPrincipal,
    #[error("annual rate must be in (0, 1]")]
    InvalidRate,
    #[error("term must be between 1 and 50 years")]
    InvalidTerm,
    #[error("at least two cashflows are required")]
    InsufficientCashflows,
    #[error("IRR did not converge within the iteration budget")]
    IrrDidNotConverge,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AmortizationRow {
    pub period: u32,
    pub payment: f64,
    pub principal_portion: f64,
    pub interest_portion: f64,
    pub remaining_balance: f64,
}

/// Equal-instalment amortisation schedule.
/// `M = P * r * (1+r)^n / ((1+r)^n - 1)`, `r = annual_rate/12`, `n = term_years*12`.
pub fn amortization_schedule(
    principal: f64,
    annual_rate: f64,
    term_years: u32,
) -> Result<(f64, Vec<AmortizationRow>), FinanceError> {
    if !(principal > 0.0) {
        return Err(FinanceError::InvalidPrincipal);
    }
    if !(annual_rate > 0.0 && annual_rate <= 1.0) {
        return Err(FinanceError::InvalidRate);
    }
    if !(1..=50).contains(&term_years) {
        return Err(FinanceError::InvalidTerm);
    }

    let r = annual_rate / 12.0;
    let n = (term_years * 12) as i32;
    let growth = (1.0 + r).powi(n);
    let monthly_payment = principal * r * growth / (growth - 1.0);

    let mut balance = principal;
    let mut rows = Vec::with_capacity(n as usize);
    for period in 1..=n {
        let interest_portion = balance * r;
        let mut principal_portion = monthly_payment - interest_portion;
        if period == n {
            // absorb rounding drift on the final instalment
            principal_portion = balance;
        }
        balance = (balance - principal_portion).max(0.0);
        rows.push(AmortizationRow {
            period: period as u32,
            payment: monthly_payment,
            principal_portion,
            interest_portion,
            remaining_balance: balance,
        });
    }

    Ok((monthly_payment, rows))
}

/// Internal rate of return via Newton's method on `NPV(rate) = 0`.
/// `cashflows[0]` is the initial outlay (conventionally negative).
pub fn irr(cashflows: &[f64]) -> Result<f64, FinanceError> {
    if cashflows.len() < 2 {
        return Err(FinanceError::InsufficientCashflows);
    }

    const TOLERANCE: f64 = 1e-10;
    const MAX_ITERATIONS: u32 = 1000;

    let mut rate = 0.1;
    for _ in 0..MAX_ITERATIONS {
        let mut npv = 0.0;
        let mut dnpv = 0.0;
        for (t, cf) in cashflows.iter().enumerate() {
            let discount = (1.0 + rate).powi(t as i32);
            npv += cf / discount;
            if t > 0 {
                dnpv -= (t as f64) * cf / ((1.0 + rate).powi(t as i32 + 1));
            }
        }

        if npv.abs() < TOLERANCE {
            return Ok(rate.clamp(-0.99, 10.0));
        }
        if dnpv.abs() < f64::EPSILON {
            break;
        }

        let next_rate = (rate - npv / dnpv).clamp(-0.99, 10.0);
        if (next_rate - rate).abs() < TOLERANCE {
            return Ok(next_rate);
        }
        rate = next_rate;
    }

    Err(FinanceError::IrrDidNotConverge)
}

/// Present value of an annual-coupon bond: sum of discounted coupons plus
/// discounted face value.
pub fn bond_price(face_value: f64, coupon_rate: f64, yield_rate: f64, years: u32) -> f64 {
    let coupon = face_value * coupon_rate;
    let mut price = 0.0;
    for t in 1..=years {
        price += coupon / (1.0 + yield_rate).powi(t as i32);
    }
    price += face_value / (1.0 + yield_rate).powi(years as i32);
    price
}

/// Macaulay duration: the coupon-weighted average time to cashflow, in years.
pub fn bond_duration(face_value: f64, coupon_rate: f64, yield_rate: f64, years: u32) -> f64 {
    let coupon = face_value * coupon_rate;
    let price = bond_price(face_value, coupon_rate, yield_rate, years);
    if price <= 0.0 {
        return 0.0;
    }

    let mut weighted_time = 0.0;
    for t in 1..=years {
        let pv = coupon / (1.0 + yield_rate).powi(t as i32);
        weighted_time += (t as f64) * pv;
    }
    let pv_face = face_value / (1.0 + yield_rate).powi(years as i32);
    weighted_time += (years as f64) * pv_face;

    weighted_time / price
}

/// Black-Scholes call and put price using an Abramowitz-Stegun approximation
/// of the standard normal CDF (accurate to ~7.5e-8).
pub fn black_scholes(spot: f64, strike: f64, years: f64, rate: f64, volatility: f64) -> (f64, f64) {
    let sqrt_t = years.sqrt();
    let d1 = ((spot / strike).ln() + (rate + 0.5 * volatility * volatility) * years)
        / (volatility * sqrt_t);
    let d2 = d1 - volatility * sqrt_t;

    let discounted_strike = strike * (-rate * years).exp();
    let call = spot * normal_cdf(d1) - discounted_strike * normal_cdf(d2);
    let put = discounted_strike * normal_cdf(-d2) - spot * normal_cdf(-d1);
    (call, put)
}

/// Abramowitz & Stegun 26.2.17 approximation of the standard normal CDF.
fn normal_cdf(x: f64) -> f64 {
    const A1: f64 = 0.319381530;
    const A2: f64 = -0.356563782;
    const A3: f64 = 1.781477937;
    const A4: f64 = -1.821255978;
    const A5: f64 = 1.330274429;
    const P: f64 = 0.2316419;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let k = 1.0 / (1.0 + P * x);
    let poly = k * (A1 + k * (A2 + k * (A3 + k * (A4 + k * A5))));
    let pdf = (-x * x / 2.0).exp() / (2.0 * std::f64::consts::PI).sqrt();
    let cdf = 1.0 - pdf * poly;

    0.5 + sign * (cdf - 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amortization_matches_known_payment() {
        let (payment, rows) = amortization_schedule(100_000.0, 0.05, 10).unwrap();
        assert!((payment - 1060.66).abs() < 0.01, "payment = {payment}");
        assert_eq!(rows.len(), 120);
        assert!(rows.last().unwrap().remaining_balance.abs() < 0.01);
    }

    #[test]
    fn amortization_rejects_invalid_inputs() {
        assert_eq!(
            amortization_schedule(-1.0, 0.05, 10).unwrap_err(),
            FinanceError::InvalidPrincipal
        );
        assert_eq!(
            amortization_schedule(1000.0, 1.5, 10).unwrap_err(),
            FinanceError::InvalidRate
        );
        assert_eq!(
            amortization_schedule(1000.0, 0.05, 60).unwrap_err(),
            FinanceError::InvalidTerm
        );
    }

    #[test]
    fn irr_finds_known_rate() {
        // -100 now, 110 in one year => 10% IRR
        let rate = irr(&[-100.0, 110.0]).unwrap();
        assert!((rate - 0.10).abs() < 1e-6, "rate = {rate}");
    }

    #[test]
    fn bond_price_at_par_when_yield_equals_coupon() {
        let price = bond_price(1000.0, 0.05, 0.05, 10);
        assert!((price - 1000.0).abs() < 0.5, "price = {price}");
    }

    #[test]
    fn bond_duration_is_bounded_by_maturity() {
        let duration = bond_duration(1000.0, 0.05, 0.05, 10);
        assert!(duration > 0.0 && duration <= 10.0);
    }

    #[test]
    fn black_scholes_call_put_parity_holds() {
        let (call, put) = black_scholes(100.0, 100.0, 1.0, 0.05, 0.2);
        let lhs = call - put;
        let rhs = 100.0 - 100.0 * (-0.05f64).exp();
        assert!((lhs - rhs).abs() < 1e-6, "lhs={lhs} rhs={rhs}");
    }
}
