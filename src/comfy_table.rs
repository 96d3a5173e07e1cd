use crate::analysis::{AnalysisReport, ComparisonAnalysis, SingleAnalysis};
use crate::error::AnalysisError;
use crate::kpi::KpiSet;
use crate::storage_utils::ReportConfig;
use crate::table::PriceTable;
use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ContentArrangement, Table, modifiers::UTF8_ROUND_CORNERS,
    presets::UTF8_BORDERS_ONLY,
};

pub const NO_DATA: &str = "No data found. Please check the stock symbols or date range.";

pub fn format_price(value: Option<f64>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| format!("${:.2}", v))
}

pub fn format_pct(value: Option<f64>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| format!("{:.2}%", v))
}

fn format_cell(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.2}", v))
}

fn base_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_BORDERS_ONLY)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// The last `rows` records of `data`, every column included.
pub fn data_table(data: &PriceTable, rows: usize) -> Table {
    let tail = data.tail(rows);

    let mut table = base_table();
    let header = std::iter::once(Cell::new("Date").add_attribute(Attribute::Bold)).chain(
        tail.column_keys().map(|key| {
            Cell::new(key)
                .add_attribute(Attribute::Bold)
                .set_alignment(CellAlignment::Right)
        }),
    );
    table.set_header(header.collect::<Vec<_>>());

    for (row, date) in tail.dates().iter().enumerate() {
        let mut cells = vec![Cell::new(date.format("%Y-%m-%d")).fg(Color::DarkGrey)];
        cells.extend(tail.columns().iter().map(|c| {
            Cell::new(format_cell(c.values[row])).set_alignment(CellAlignment::Right)
        }));
        table.add_row(cells);
    }
    table
}

pub fn kpi_table(kpis: &KpiSet) -> Table {
    let mut table = base_table();
    table.set_header(vec![
        Cell::new("Indicator").add_attribute(Attribute::Bold),
        Cell::new("Value")
            .add_attribute(Attribute::Bold)
            .set_alignment(CellAlignment::Right),
    ]);

    for (i, (label, value)) in kpis.entries().into_iter().enumerate() {
        // first three are prices, the rest are percentages
        let text = if i < 3 {
            format_price(value)
        } else {
            format_pct(value)
        };
        table.add_row(vec![
            Cell::new(label).fg(Color::Cyan),
            Cell::new(text)
                .fg(Color::Green)
                .set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

fn render_single(single: &SingleAnalysis, config: &ReportConfig) -> String {
    format!(
        "\n{} Stock Data (Last {} rows)\n{}\n\nKey Performance Indicators\n{}",
        single.ticker,
        config.tail_rows,
        data_table(&single.table, config.tail_rows),
        kpi_table(&single.kpis),
    )
}

/// Both close columns followed by both return columns.
fn comparison_view(cmp: &ComparisonAnalysis) -> Result<PriceTable, AnalysisError> {
    let returns = [&cmp.comparison.returns_a, &cmp.comparison.returns_b];
    let keys = cmp
        .close_columns
        .iter()
        .chain(returns.iter().map(|series| &series.name));

    let mut view = PriceTable::new(cmp.table.dates().to_vec())?;
    for key in keys {
        let values = cmp.table.column(key).ok_or_else(|| {
            AnalysisError::InvalidTable(format!("comparison table lacks column '{}'", key))
        })?;
        view.insert_column(key.clone(), values.to_vec())?;
    }
    Ok(view)
}

fn render_comparison(
    cmp: &ComparisonAnalysis,
    config: &ReportConfig,
) -> Result<String, AnalysisError> {
    let [a, b] = &cmp.tickers;
    let view = comparison_view(cmp)?;

    Ok(format!(
        "\nClosing Price Comparison: {} vs {} (Last {} rows)\n{}",
        a,
        b,
        config.tail_rows,
        data_table(&view, config.tail_rows),
    ))
}

/// Text report for the terminal.
pub fn render_report(
    report: &AnalysisReport,
    config: &ReportConfig,
) -> Result<String, AnalysisError> {
    match report {
        AnalysisReport::Empty => Ok(NO_DATA.to_string()),
        AnalysisReport::Single(single) => Ok(render_single(single, config)),
        AnalysisReport::Comparison(cmp) => render_comparison(cmp, config),
    }
}

pub fn run(report: &AnalysisReport, config: &ReportConfig) -> anyhow::Result<()> {
    println!("{}", render_report(report, config)?);
    Ok(())
}
