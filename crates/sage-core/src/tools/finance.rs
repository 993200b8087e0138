//! Financial calculator tools (spec.md §4.2): thin JSON-argument wrappers
//! around the pure math in `sage_tools::finance`.

use async_trait::async_trait;
use serde_json::json;

use sage_tools::finance;

use super::{ToolContext, ToolDescriptor};

fn number_arg(args: &serde_json::Value, key: &str) -> anyhow::Result<f64> {
    args.get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| anyhow::anyhow!("'{key}' argument required and must be numeric"))
}

fn int_arg(args: &serde_json::Value, key: &str) -> anyhow::Result<u32> {
    args.get(key)
        .and_then(|v| v.as_u64())
        .map(|v| v as u32)
        .ok_or_else(|| anyhow::anyhow!("'{key}' argument required and must be a positive integer"))
}

pub struct CalculateAmortizationTool;

#[async_trait]
impl ToolDescriptor for CalculateAmortizationTool {
    fn name(&self) -> &str {
        "calculateAmortization"
    }

    fn description(&self) -> &str {
        "Compute an equal-instalment loan amortisation schedule given principal, annual \
         interest rate (as a fraction, e.g. 0.05 for 5%), and term in years."
    }

    fn parameter_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "principal": {"type": "number"},
                "annualRate": {"type": "number", "description": "Fraction in (0, 1], e.g. 0.05 for 5%"},
                "termYears": {"type": "integer", "description": "Between 1 and 50"}
            },
            "required": ["principal", "annualRate", "termYears"]
        })
    }

    async fn invoke(&self, args: serde_json::Value, _ctx: &ToolContext) -> anyhow::Result<String> {
        let principal = number_arg(&args, "principal")?;
        let annual_rate = number_arg(&args, "annualRate")?;
        let term_years = int_arg(&args, "termYears")?;

        let (monthly_payment, schedule) =
            finance::amortization_schedule(principal, annual_rate, term_years)?;

        Ok(format!(
            "Monthly payment: {monthly_payment:.2}\nTotal payments: {}\nTotal interest: {:.2}",
            schedule.len(),
            schedule.iter().map(|r| r.interest_portion).sum::<f64>()
        ))
    }
}

pub struct CalculateIrrTool;

#[async_trait]
impl ToolDescriptor for CalculateIrrTool {
    fn name(&self) -> &str {
        "calculateIRR"
    }

    fn description(&self) -> &str {
        "Compute the internal rate of return for a series of cashflows, given as a \
         comma-separated list where the first value is the initial (typically negative) outlay."
    }

    fn parameter_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {"cashflows": {"type": "string", "description": "Comma-separated cashflow values, e.g. \"-1000,300,300,300,300\""}},
            "required": ["cashflows"]
        })
    }

    async fn invoke(&self, args: serde_json::Value, _ctx: &ToolContext) -> anyhow::Result<String> {
        let csv = args
            .get("cashflows")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("'cashflows' argument required"))?;

        let cashflows: Vec<f64> = csv
            .split(',')
            .map(|s| s.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|e| anyhow::anyhow!("could not parse cashflows '{csv}': {e}"))?;

        let rate = finance::irr(&cashflows)?;
        Ok(format!("IRR: {:.4}%", rate * 100.0))
    }
}

pub struct CalculateBondPriceTool;

#[async_trait]
impl ToolDescriptor for CalculateBondPriceTool {
    fn name(&self) -> &str {
        "calculateBondPrice"
    }

    fn description(&self) -> &str {
        "Compute the present value of an annual-coupon bond given face value, coupon rate, \
         yield, and years to maturity."
    }

    fn parameter_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "faceValue": {"type": "number"},
                "couponRate": {"type": "number"},
                "yield": {"type": "number"},
                "years": {"type": "integer"}
            },
            "required": ["faceValue", "couponRate", "yield", "years"]
        })
    }

    async fn invoke(&self, args: serde_json::Value, _ctx: &ToolContext) -> anyhow::Result<String> {
        let face_value = number_arg(&args, "faceValue")?;
        let coupon_rate = number_arg(&args, "couponRate")?;
        let yield_rate = number_arg(&args, "yield")?;
        let years = int_arg(&args, "years")?;

        let price = finance::bond_price(face_value, coupon_rate, yield_rate, years);
        Ok(format!("Bond price: {price:.2}"))
    }
}

pub struct CalculateBondDurationTool;

#[async_trait]
impl ToolDescriptor for CalculateBondDurationTool {
    fn name(&self) -> &str {
        "calculateBondDuration"
    }

    fn description(&self) -> &str {
        "Compute the Macaulay duration (in years) of an annual-coupon bond given face value, \
         coupon rate, yield, and years to maturity."
    }

    fn parameter_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "faceValue": {"type": "number"},
                "couponRate": {"type": "number"},
                "yield": {"type": "number"},
                "years": {"type": "integer"}
            },
            "required": ["faceValue", "couponRate", "yield", "years"]
        })
    }

    async fn invoke(&self, args: serde_json::Value, _ctx: &ToolContext) -> anyhow::Result<String> {
        let face_value = number_arg(&args, "faceValue")?;
        let coupon_rate = number_arg(&args, "couponRate")?;
        let yield_rate = number_arg(&args, "yield")?;
        let years = int_arg(&args, "years")?;

        let duration = finance::bond_duration(face_value, coupon_rate, yield_rate, years);
        Ok(format!("Macaulay duration: {duration:.4} years"))
    }
}

pub struct CalculateOptionPriceTool;

#[async_trait]
impl ToolDescriptor for CalculateOptionPriceTool {
    fn name(&self) -> &str {
        "calculateOptionPrice"
    }

    fn description(&self) -> &str {
        "Price a European call and put option via Black-Scholes given spot, strike, time to \
         expiry (years), risk-free rate, and volatility."
    }

    fn parameter_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "spot": {"type": "number"},
                "strike": {"type": "number"},
                "years": {"type": "number", "description": "Time to expiry in years"},
                "rate": {"type": "number", "description": "Risk-free annual rate"},
                "volatility": {"type": "number", "description": "Annualised volatility (e.g. 0.2 for 20%)"}
            },
            "required": ["spot", "strike", "years", "rate", "volatility"]
        })
    }

    async fn invoke(&self, args: serde_json::Value, _ctx: &ToolContext) -> anyhow::Result<String> {
        let spot = number_arg(&args, "spot")?;
        let strike = number_arg(&args, "strike")?;
        let years = number_arg(&args, "years")?;
        let rate = number_arg(&args, "rate")?;
        let volatility = number_arg(&args, "volatility")?;

        let (call, put) = finance::black_scholes(spot, strike, years, rate, volatility);
        Ok(format!("Call: {call:.4}\nPut: {put:.4}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::tests_support::dummy_context;

    #[tokio::test]
    async fn amortization_delegation_produces_known_monthly_figure() {
        let tool = CalculateAmortizationTool;
        let ctx = dummy_context();
        let result = tool
            .invoke(
                json!({"principal": 100000.0, "annualRate": 0.05, "termYears": 10}),
                &ctx,
            )
            .await
            .unwrap();
        assert!(result.contains("1060.66"), "result = {result}");
    }

    #[tokio::test]
    async fn irr_tool_parses_csv_cashflows() {
        let tool = CalculateIrrTool;
        let ctx = dummy_context();
        let result = tool
            .invoke(json!({"cashflows": "-100,110"}), &ctx)
            .await
            .unwrap();
        assert!(result.contains("10.00"), "result = {result}");
    }

    #[tokio::test]
    async fn bond_price_at_par() {
        let tool = CalculateBondPriceTool;
        let ctx = dummy_context();
        let result = tool
            .invoke(
                json!({"faceValue": 1000.0, "couponRate": 0.05, "yield": 0.05, "years": 10}),
                &ctx,
            )
            .await
            .unwrap();
        assert!(result.contains("1000"), "result = {result}");
    }
}
