use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use num_format::{Locale, ToFormattedString as _};

/// Currency every expense is stored and submitted in.
pub const BASE_CURRENCY: Currency = Currency::Jpy;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Currency {
    #[default]
    Jpy,
    Twd,
    Usd,
}

impl Currency {
    pub const ALL: [Currency; 3] = [Currency::Jpy, Currency::Twd, Currency::Usd];

    pub fn code(self) -> &'static str {
        match self {
            Currency::Jpy => "JPY",
            Currency::Twd => "TWD",
            Currency::Usd => "USD",
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Currency::Jpy => "¥",
            Currency::Twd => "NT$",
            Currency::Usd => "$",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Currency::Jpy => "Yen (JPY)",
            Currency::Twd => "Taiwan dollar (TWD)",
            Currency::Usd => "US dollar (USD)",
        }
    }

    /// Display precision. TWD is shown in whole dollars like the base.
    pub fn decimals(self) -> u32 {
        match self {
            Currency::Jpy | Currency::Twd => 0,
            Currency::Usd => 2,
        }
    }

    pub fn next(self) -> Self {
        match self {
            Currency::Jpy => Currency::Twd,
            Currency::Twd => Currency::Usd,
            Currency::Usd => Currency::Jpy,
        }
    }
}

impl Display for Currency {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Currency::ALL
            .into_iter()
            .find(|currency| currency.code().eq_ignore_ascii_case(raw.trim()))
            .ok_or_else(|| format!("unknown currency '{raw}', expected JPY, TWD or USD"))
    }
}

/// Rates from the base currency into the two display currencies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExchangeRates {
    pub twd: f64,
    pub usd: f64,
}

impl ExchangeRates {
    /// Picks the two rates out of a code → rate table; both must be present.
    pub fn from_table(table: &HashMap<String, f64>) -> Option<Self> {
        Some(Self {
            twd: *table.get(Currency::Twd.code())?,
            usd: *table.get(Currency::Usd.code())?,
        })
    }

    pub fn rate(&self, currency: Currency) -> f64 {
        match currency {
            Currency::Jpy => 1.0,
            Currency::Twd => self.twd,
            Currency::Usd => self.usd,
        }
    }
}

/// Converts a base amount for display, rounded to the currency's precision.
/// Without rates the base amount is returned unchanged.
pub fn convert(amount: u64, currency: Currency, rates: Option<&ExchangeRates>) -> f64 {
    let Some(rates) = rates else {
        return amount as f64;
    };
    let scale = 10f64.powi(currency.decimals() as i32);
    (amount as f64 * rates.rate(currency) * scale).round() / scale
}

pub fn format_amount(amount: u64, currency: Currency, rates: Option<&ExchangeRates>) -> String {
    let value = convert(amount, currency, rates);
    let decimals = currency.decimals();
    if decimals == 0 {
        let whole = value.round() as i64;
        return format!("{}{}", currency.symbol(), whole.to_formatted_string(&Locale::en));
    }

    let scale = 10i64.pow(decimals);
    let minor = (value * scale as f64).round() as i64;
    format!(
        "{}{}.{:0width$}",
        currency.symbol(),
        (minor / scale).to_formatted_string(&Locale::en),
        (minor % scale).abs(),
        width = decimals as usize
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{Currency, ExchangeRates, convert, format_amount};

    const RATES: ExchangeRates = ExchangeRates {
        twd: 0.21,
        usd: 0.0067,
    };

    #[test]
    fn twd_rounds_to_whole_dollars() {
        assert_eq!(convert(1000, Currency::Twd, Some(&RATES)), 210.0);
        assert_eq!(format_amount(1000, Currency::Twd, Some(&RATES)), "NT$210");
    }

    #[test]
    fn usd_rounds_to_cents() {
        assert_eq!(convert(1000, Currency::Usd, Some(&RATES)), 6.7);
        assert_eq!(format_amount(1000, Currency::Usd, Some(&RATES)), "$6.70");
        assert_eq!(format_amount(1_234_567, Currency::Usd, Some(&RATES)), "$8,271.60");
    }

    #[test]
    fn base_amounts_get_thousands_separators() {
        assert_eq!(format_amount(123_456, Currency::Jpy, Some(&RATES)), "¥123,456");
        assert_eq!(format_amount(0, Currency::Jpy, None), "¥0");
    }

    #[test]
    fn missing_rates_fall_back_to_base_amount() {
        assert_eq!(convert(1000, Currency::Usd, None), 1000.0);
        assert_eq!(format_amount(1000, Currency::Twd, None), "NT$1,000");
    }

    #[test]
    fn rates_table_needs_both_codes() {
        let mut table = HashMap::new();
        table.insert("TWD".to_string(), 0.21);
        assert!(ExchangeRates::from_table(&table).is_none());
        table.insert("USD".to_string(), 0.0067);
        assert_eq!(ExchangeRates::from_table(&table), Some(RATES));
    }

    #[test]
    fn parses_currency_codes() {
        assert_eq!("usd".parse::<Currency>(), Ok(Currency::Usd));
        assert!("EUR".parse::<Currency>().is_err());
        assert_eq!(Currency::Usd.next(), Currency::Jpy);
    }
}
