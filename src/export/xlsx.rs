//! Styled xlsx workbook output

use rust_xlsxwriter::{
    Color, ConditionalFormat3ColorScale, ConditionalFormatDataBar, ConditionalFormatType, Format,
    FormatAlign, FormatBorder, Table, TableColumn, TableStyle, Workbook, Worksheet, XlsxError,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{ResultSink, SaveRequest, SinkError, SummaryStats, output_file_name};
use crate::extraction::{Field, ListingRecord, clean_phone};

pub const DATA_SHEET: &str = "Data";
pub const SUMMARY_SHEET: &str = "Summary Statistics";

const HEADER_BLUE: u32 = 0x1F4E79;
const LOW_RED: u32 = 0xFF6B6B;
const MID_YELLOW: u32 = 0xFFE66D;
const HIGH_TEAL: u32 = 0x4ECDC4;
const BAR_BLUE: u32 = 0x5B9BD5;

const EXTRACTION_DATE_COLUMN: &str = "extraction_date";
const SEARCH_QUERY_COLUMN: &str = "search_query";

fn column_width(column: &str) -> f64 {
    match column {
        "name" | "email" => 30.0,
        "phone" => 18.0,
        "website" => 35.0,
        "address" => 40.0,
        "rating" => 8.0,
        "reviews_count" | "price_level" => 12.0,
        "hours" => 25.0,
        _ => 20.0,
    }
}

/// Writes one workbook per save into `directory`
#[derive(Debug, Clone)]
pub struct XlsxSink {
    directory: PathBuf,
    prefix: String,
}

impl XlsxSink {
    pub fn new(directory: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            prefix: prefix.into(),
        }
    }
}

impl ResultSink for XlsxSink {
    fn save(&self, records: &[ListingRecord], request: &SaveRequest) -> Result<PathBuf, SinkError> {
        if records.is_empty() {
            return Err(SinkError::Empty);
        }

        std::fs::create_dir_all(&self.directory)?;
        let path = self.directory.join(output_file_name(&self.prefix, request));

        write_workbook(records, request, &path)?;
        info!("Wrote {} records to {}", records.len(), path.display());

        Ok(path)
    }
}

fn write_workbook(
    records: &[ListingRecord],
    request: &SaveRequest,
    path: &Path,
) -> Result<(), XlsxError> {
    let mut workbook = Workbook::new();
    workbook.push_worksheet(data_sheet(records, request)?);
    workbook.push_worksheet(summary_sheet(&SummaryStats::from_records(records), request)?);
    workbook.save(path)
}

fn data_sheet(records: &[ListingRecord], request: &SaveRequest) -> Result<Worksheet, XlsxError> {
    let mut sheet = Worksheet::new();
    sheet.set_name(DATA_SHEET)?;

    let mut columns: Vec<&str> = Field::ALL.iter().map(|f| f.column_name()).collect();
    columns.push(EXTRACTION_DATE_COLUMN);
    if request.query.is_some() {
        columns.push(SEARCH_QUERY_COLUMN);
    }

    let header = Format::new()
        .set_bold()
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(HEADER_BLUE))
        .set_border(FormatBorder::Thin)
        .set_align(FormatAlign::Center);
    let cell = Format::new().set_border(FormatBorder::Thin);
    let extracted_at = request.extracted_at.format("%Y-%m-%d %H:%M:%S").to_string();

    for (offset, record) in records.iter().enumerate() {
        let row = offset as u32 + 1;
        let mut col: u16 = 0;

        for field in Field::ALL {
            let text = match field {
                Field::Name => record.name.clone(),
                Field::Phone => record.phone.as_deref().map(clean_phone),
                Field::Email => record.email.clone(),
                Field::Website => record.website.clone(),
                Field::Address => record.address.clone(),
                Field::Category => record.category.clone(),
                Field::Hours => record.hours.clone(),
                Field::PriceLevel => record.price_level.clone(),
                Field::Rating | Field::ReviewsCount => None,
            };

            let number = match field {
                Field::Rating => record.rating,
                Field::ReviewsCount => record.reviews_count.map(|n| n as f64),
                _ => None,
            };

            match (text, number) {
                (Some(text), _) => sheet.write_string_with_format(row, col, text, &cell)?,
                (None, Some(number)) => sheet.write_number_with_format(row, col, number, &cell)?,
                (None, None) => sheet.write_blank(row, col, &cell)?,
            };
            col += 1;
        }

        sheet.write_string_with_format(row, col, &extracted_at, &cell)?;
        if let Some(query) = &request.query {
            sheet.write_string_with_format(row, col + 1, query, &cell)?;
        }
    }

    let last_row = records.len() as u32;
    let last_col = (columns.len() - 1) as u16;

    let table_columns: Vec<TableColumn> = columns
        .iter()
        .map(|name| {
            TableColumn::new()
                .set_header(*name)
                .set_header_format(header.clone())
        })
        .collect();
    let table = Table::new()
        .set_style(TableStyle::Medium9)
        .set_banded_rows(true)
        .set_columns(&table_columns);
    sheet.add_table(0, 0, last_row, last_col, &table)?;

    let rating_col = column_index(&columns, Field::Rating.column_name());
    let scale = ConditionalFormat3ColorScale::new()
        .set_minimum_color(Color::RGB(LOW_RED))
        .set_midpoint(ConditionalFormatType::Percentile, 50)
        .set_midpoint_color(Color::RGB(MID_YELLOW))
        .set_maximum_color(Color::RGB(HIGH_TEAL));
    sheet.add_conditional_format(1, rating_col, last_row, rating_col, &scale)?;

    if records.iter().any(|r| r.reviews_count.is_some()) {
        let reviews_col = column_index(&columns, Field::ReviewsCount.column_name());
        let bar = ConditionalFormatDataBar::new().set_fill_color(Color::RGB(BAR_BLUE));
        sheet.add_conditional_format(1, reviews_col, last_row, reviews_col, &bar)?;
    }

    for (index, name) in columns.iter().enumerate() {
        sheet.set_column_width(index as u16, column_width(name))?;
    }
    sheet.set_freeze_panes(1, 0)?;

    debug!("Data sheet: {} rows x {} columns", records.len(), columns.len());
    Ok(sheet)
}

fn column_index(columns: &[&str], name: &str) -> u16 {
    columns.iter().position(|c| *c == name).unwrap_or_default() as u16
}

fn summary_sheet(stats: &SummaryStats, request: &SaveRequest) -> Result<Worksheet, XlsxError> {
    let mut sheet = Worksheet::new();
    sheet.set_name(SUMMARY_SHEET)?;

    let title = Format::new()
        .set_bold()
        .set_font_size(14)
        .set_font_color(Color::RGB(HEADER_BLUE));
    let section = Format::new()
        .set_bold()
        .set_font_color(Color::RGB(HEADER_BLUE));
    let two_decimals = Format::new().set_num_format("0.00");

    sheet.write_string_with_format(0, 0, SUMMARY_SHEET, &title)?;

    sheet.write_string_with_format(2, 0, "Data Overview", &section)?;
    let counts = [
        ("Total Records", stats.total),
        ("Records with Phone", stats.with_phone),
        ("Records with Email", stats.with_email),
        ("Records with Website", stats.with_website),
        ("Records with Rating", stats.with_rating),
    ];
    for (offset, (label, value)) in counts.iter().enumerate() {
        let row = 3 + offset as u32;
        sheet.write_string(row, 0, *label)?;
        sheet.write_number(row, 1, *value as f64)?;
    }

    sheet.write_string_with_format(9, 0, "Rating Statistics", &section)?;
    let ratings = [
        ("Average Rating", stats.average_rating),
        ("Highest Rating", stats.highest_rating),
        ("Lowest Rating", stats.lowest_rating),
    ];
    for (offset, (label, value)) in ratings.iter().enumerate() {
        let row = 10 + offset as u32;
        sheet.write_string(row, 0, *label)?;
        sheet.write_number_with_format(row, 1, *value, &two_decimals)?;
    }

    sheet.write_string_with_format(14, 0, "Extraction Info", &section)?;
    sheet.write_string(15, 0, "Extraction Date")?;
    sheet.write_string(
        15,
        1,
        request.extracted_at.format("%Y-%m-%d %H:%M:%S").to_string(),
    )?;
    sheet.write_string(16, 0, "Search Query")?;
    sheet.write_string(16, 1, request.query.as_deref().unwrap_or("Not provided"))?;

    sheet.set_column_width(0, 20)?;
    sheet.set_column_width(1, 25)?;

    Ok(sheet)
}
