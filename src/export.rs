//! Excel workbooks for attendance exports, returned as in-memory buffers.

use chrono::{NaiveDate, NaiveTime};
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, FormatPattern, Workbook, Worksheet};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::attendance::summary::compute_summary;
use crate::error::AppResult;
use crate::model::attendance::WorkerAttendanceRow;
use crate::model::warehouse::SubWarehouseInfo;
use crate::utils::time_of_day::{TimeOfDay, minutes_to_time};

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

const DATE_FORMAT: &str = "%d/%m/%Y";

/// One line of the selected-dates sheet. Worker columns are empty for dates
/// without attendance rows.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DateSheetRow {
    pub calendar_date: NaiveDate,
    pub worker_name: Option<String>,
    pub national_id: Option<String>,
    pub entry_time: Option<NaiveTime>,
    pub exit_time: Option<NaiveTime>,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SelectedDatesRequest {
    #[schema(example = json!([31, 32]))]
    pub scheduled_date_ids: Vec<u64>,
    #[schema(example = 4)]
    pub sub_warehouse_id: Option<u64>,
}

/// Worked and extra minutes for one row of the selected-dates sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayFigures {
    pub worked_minutes: i64,
    /// Negative when the shift was not completed.
    pub extra_minutes: i64,
    pub attended: bool,
}

/// Break time is deducted from the interval. Without a configured shift
/// length there is no extra time. Values may be negative.
pub fn day_figures(
    entry: Option<TimeOfDay>,
    exit: Option<TimeOfDay>,
    break_duration: Option<TimeOfDay>,
    shift_duration: Option<TimeOfDay>,
) -> DayFigures {
    let (Some(entry), Some(exit)) = (entry, exit) else {
        return DayFigures {
            worked_minutes: 0,
            extra_minutes: 0,
            attended: false,
        };
    };

    let worked = i64::from(exit.minutes())
        - i64::from(entry.minutes())
        - break_duration.map_or(0, |b| i64::from(b.minutes()));
    let extra = shift_duration.map_or(0, |s| worked - i64::from(s.minutes()));

    DayFigures {
        worked_minutes: worked,
        extra_minutes: extra,
        attended: worked > 0,
    }
}

struct Styles {
    header: Format,
    label: Format,
    cell: Format,
    banded: Format,
}

impl Styles {
    fn new(header_color: u32) -> Self {
        let cell = Format::new()
            .set_align(FormatAlign::Center)
            .set_border(FormatBorder::Thin);
        Self {
            header: Format::new()
                .set_bold()
                .set_font_color(Color::RGB(0xFFFFFF))
                .set_background_color(Color::RGB(header_color))
                .set_pattern(FormatPattern::Solid)
                .set_align(FormatAlign::Center)
                .set_border(FormatBorder::Thin),
            label: Format::new().set_bold(),
            banded: cell
                .clone()
                .set_background_color(Color::RGB(0xF8F9FA))
                .set_pattern(FormatPattern::Solid),
            cell,
        }
    }
}

fn write_row(
    sheet: &mut Worksheet,
    row: u32,
    values: &[String],
    format: &Format,
) -> AppResult<()> {
    for (col, value) in values.iter().enumerate() {
        sheet.write_with_format(row, col as u16, value.as_str(), format)?;
    }
    Ok(())
}

fn set_widths(sheet: &mut Worksheet, widths: &[f64]) -> AppResult<()> {
    for (col, width) in widths.iter().enumerate() {
        sheet.set_column_width(col as u16, *width)?;
    }
    Ok(())
}

fn time_cell(t: Option<NaiveTime>) -> String {
    t.map(|t| TimeOfDay::from(t).to_string()).unwrap_or_default()
}

/// Summary block on top, one detail row per attendance below it.
pub fn worker_range_workbook(rows: &[WorkerAttendanceRow]) -> AppResult<Vec<u8>> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Attendance summary")?;

    let summary_styles = Styles::new(0xFFC000);
    let styles = Styles::new(0x002060);
    let summary = compute_summary(rows);

    write_row(
        sheet,
        0,
        &[
            "Target hours".into(),
            "Worked hours".into(),
            "Overtime hours".into(),
            "Shortfall hours".into(),
        ],
        &summary_styles.header,
    )?;
    write_row(
        sheet,
        1,
        &[
            format!("{:.2}", summary.hours_target),
            format!("{:.2}", summary.hours_worked),
            format!("{:.2}", summary.hours_overtime),
            format!("{:.2}", summary.hours_shortfall),
        ],
        &styles.cell,
    )?;

    let headers = [
        "Date",
        "National ID",
        "Name",
        "Sub-warehouse",
        "Warehouse",
        "Entry",
        "Exit",
        "Note",
    ]
    .map(String::from);
    write_row(sheet, 4, &headers, &styles.header)?;

    for (i, r) in rows.iter().enumerate() {
        let format = if i % 2 == 0 { &styles.cell } else { &styles.banded };
        write_row(
            sheet,
            5 + i as u32,
            &[
                r.calendar_date.format(DATE_FORMAT).to_string(),
                r.national_id.clone(),
                r.worker_name.clone(),
                r.sub_warehouse_name.clone(),
                r.warehouse_name.clone(),
                time_cell(r.entry_time),
                time_cell(r.exit_time),
                r.note.clone().unwrap_or_default(),
            ],
            format,
        )?;
    }

    set_widths(sheet, &[18.0, 20.0, 35.0, 20.0, 20.0, 18.0, 18.0, 25.0])?;
    Ok(workbook.save_to_buffer()?)
}

/// Location block on top, then one row per attendance of the selected dates
/// with worked time after break and the difference against the shift length.
pub fn selected_dates_workbook(
    info: Option<&SubWarehouseInfo>,
    rows: &[DateSheetRow],
) -> AppResult<Vec<u8>> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Attendance by date")?;

    let styles = Styles::new(0x1F4E79);
    let unspecified = || "Not specified".to_string();
    let break_duration = info.and_then(|i| i.break_duration).map(TimeOfDay::from);
    let shift_duration = info.and_then(|i| i.shift_duration).map(TimeOfDay::from);
    let duration_text = |d: Option<TimeOfDay>| d.map(|d| d.to_string());

    let header_block = [
        ("WAREHOUSE:", info.map(|i| i.warehouse.clone())),
        ("SUB-WAREHOUSE:", info.map(|i| i.sub_warehouse.clone())),
        ("BREAK:", duration_text(break_duration)),
        ("SHIFT:", duration_text(shift_duration)),
    ];
    for (row, (label, value)) in header_block.into_iter().enumerate() {
        sheet.write_with_format(row as u32, 0, label, &styles.label)?;
        sheet.write(row as u32, 1, value.unwrap_or_else(unspecified).as_str())?;
    }
    sheet.set_row_height(4, 5)?;

    let headers = [
        "DATE",
        "NAME",
        "NATIONAL ID",
        "ENTRY",
        "EXIT",
        "BREAK",
        "SHIFT",
        "WORKED",
        "EXTRA",
        "ATTENDED",
        "NOTE",
    ]
    .map(String::from);
    write_row(sheet, 5, &headers, &styles.header)?;

    let break_cell = duration_text(break_duration).unwrap_or_default();
    let shift_cell = duration_text(shift_duration).unwrap_or_default();

    for (i, r) in rows.iter().enumerate() {
        let format = if i % 2 == 0 { &styles.cell } else { &styles.banded };
        let line = if r.worker_name.is_none() {
            vec![
                r.calendar_date.format(DATE_FORMAT).to_string(),
                "No attendance recorded".into(),
                String::new(),
                String::new(),
                String::new(),
                break_cell.clone(),
                shift_cell.clone(),
                String::new(),
                String::new(),
                "F".into(),
                String::new(),
            ]
        } else {
            let figures = day_figures(
                r.entry_time.map(TimeOfDay::from),
                r.exit_time.map(TimeOfDay::from),
                break_duration,
                shift_duration,
            );
            vec![
                r.calendar_date.format(DATE_FORMAT).to_string(),
                r.worker_name.clone().unwrap_or_default(),
                r.national_id.clone().unwrap_or_default(),
                time_cell(r.entry_time),
                time_cell(r.exit_time),
                break_cell.clone(),
                shift_cell.clone(),
                minutes_to_time(figures.worked_minutes),
                minutes_to_time(figures.extra_minutes),
                if figures.attended { "A" } else { "F" }.into(),
                r.note.clone().unwrap_or_default(),
            ]
        };
        write_row(sheet, 6 + i as u32, &line, format)?;
    }

    set_widths(
        sheet,
        &[15.0, 35.0, 12.0, 18.0, 18.0, 15.0, 15.0, 18.0, 15.0, 15.0, 25.0],
    )?;
    Ok(workbook.save_to_buffer()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> Option<TimeOfDay> {
        Some(TimeOfDay::parse(s).unwrap())
    }

    #[test]
    fn figures_deduct_break_and_compare_to_shift() {
        let f = day_figures(t("08:00"), t("17:00"), t("01:00"), t("08:00"));
        assert_eq!(f.worked_minutes, 480);
        assert_eq!(f.extra_minutes, 0);
        assert!(f.attended);

        let short = day_figures(t("08:00"), t("14:30"), t("00:30"), t("08:00"));
        assert_eq!(minutes_to_time(short.extra_minutes), "-02:00:00");
    }

    #[test]
    fn missing_times_mean_not_attended() {
        let f = day_figures(None, t("17:00"), None, t("08:00"));
        assert_eq!(f.worked_minutes, 0);
        assert!(!f.attended);

        // placeholder rows are still at the sentinel
        let f = day_figures(t("00:00"), t("00:00"), t("01:00"), None);
        assert_eq!(f.worked_minutes, -60);
        assert!(!f.attended);
    }

    #[test]
    fn workbooks_are_valid_zip_containers() {
        let info = SubWarehouseInfo {
            sub_warehouse: "Cold storage A1".into(),
            warehouse: "Central".into(),
            break_duration: NaiveTime::from_hms_opt(1, 0, 0),
            shift_duration: NaiveTime::from_hms_opt(8, 0, 0),
        };
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let rows = vec![
            DateSheetRow {
                calendar_date: date,
                worker_name: Some("Ana".into()),
                national_id: Some("01234567".into()),
                entry_time: NaiveTime::from_hms_opt(8, 0, 0),
                exit_time: NaiveTime::from_hms_opt(17, 0, 0),
                note: None,
            },
            DateSheetRow {
                calendar_date: date,
                worker_name: None,
                national_id: None,
                entry_time: None,
                exit_time: None,
                note: None,
            },
        ];

        let bytes = selected_dates_workbook(Some(&info), &rows).unwrap();
        assert_eq!(&bytes[..2], b"PK");

        let bytes = worker_range_workbook(&[]).unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }
}
