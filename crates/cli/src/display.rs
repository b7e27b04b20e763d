//! Console rendering of ranked opportunities.

use std::fmt::Write as _;
use std::io::{self, Write};

use anyhow::Result;
use cex_spread_arbitrage::{IterationReport, OpportunitySink, RankedOpportunity};
use crossterm::cursor::MoveTo;
use crossterm::execute;
use crossterm::style::Stylize;
use crossterm::terminal::{Clear, ClearType};
use rust_decimal::Decimal;

const COLUMNS: [&str; 9] = [
    "Base", "Buy market", "Sell market", "Bid/Ask (buy)", "Bid/Ask (sell)", "Spread %", "Fees %",
    "Net %", "Tradeable USDT",
];

/// Clears the terminal and prints the ranked table every iteration.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink {
    /// Disable clearing and colors, e.g. when stdout is not a terminal.
    pub plain: bool,
}

impl OpportunitySink for ConsoleSink {
    fn publish(&self, report: &IterationReport) -> Result<()> {
        let mut stdout = io::stdout().lock();
        if !self.plain {
            execute!(stdout, Clear(ClearType::All), MoveTo(0, 0))?;
        }
        stdout.write_all(render(report, !self.plain).as_bytes())?;
        stdout.flush()?;
        Ok(())
    }
}

fn price(value: Option<Decimal>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.normalize().to_string())
}

fn header() -> String {
    let c = COLUMNS;
    format!(
        "{:<13} {:<15} {:<15} {:<27} {:<27} {:<10} {:<8} {:<9} {}",
        c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7], c[8]
    )
}

fn row(o: &RankedOpportunity, colored: bool) -> String {
    let c = &o.candidate;
    let buy_book = format!("{}/{}", price(o.buy_quote.bid), price(o.buy_quote.ask));
    let sell_book = format!("{}/{}", price(o.sell_quote.bid), price(o.sell_quote.ask));
    let net = format!("{:<9}", o.net_profit_pct.round_dp(4));
    let net = match (colored, o.is_profitable()) {
        (false, _) => net,
        (true, true) => net.green().to_string(),
        (true, false) => net.red().to_string(),
    };

    format!(
        "{:<13} {:<15} {:<15} {:<27} {:<27} {:<10} {:<8} {} {}",
        c.label(),
        c.buy_market.to_string(),
        c.sell_market.to_string(),
        buy_book,
        sell_book,
        c.spread_pct.round_dp(4),
        o.total_fees_pct.round_dp(4),
        net,
        c.tradeable_usdt.round_dp(2),
    )
}

/// Formats a report as a text table.
#[must_use]
pub fn render(report: &IterationReport, colored: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}  candidates: {}",
        report.captured_at.format("%Y-%m-%d %H:%M:%S UTC"),
        report.candidate_count
    );
    let _ = writeln!(out, "{}", header());
    if report.opportunities.is_empty() {
        let _ = writeln!(out, "(no opportunities)");
    }
    for o in &report.opportunities {
        let _ = writeln!(out, "{}", row(o, colored));
    }
    out
}
