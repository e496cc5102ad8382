//! Downloadable upload template: one sheet with the expected header row
//! and two example rows (one singles, one doubles).

use anyhow::{Context, Result};
use rust_xlsxwriter::{Format, Workbook};

pub const TEMPLATE_FILENAME: &str = "match-upload-template.xlsx";

const HEADERS: [&str; 15] = [
    "player1", "player2", "player3", "player4", "score1", "score2", "gender1", "gender2",
    "gender3", "gender4", "dob1", "dob2", "dob3", "dob4", "notes",
];

/// Build the template workbook as xlsx bytes.
pub fn build_template() -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet
        .set_name("Open")
        .context("Failed to name template sheet")?;

    let header_format = Format::new().set_bold();
    for (col, header) in HEADERS.iter().enumerate() {
        worksheet
            .write_with_format(0, col as u16, *header, &header_format)
            .with_context(|| format!("Failed to write template header '{}'", header))?;
        worksheet
            .set_column_width(col as u16, 12)
            .context("Failed to size template column")?;
    }

    // Example singles row: passports and scores only
    worksheet.write(1, 0, "CBSPZV").context("template row")?;
    worksheet.write(1, 1, "QXLMNA").context("template row")?;
    worksheet.write(1, 4, 11).context("template row")?;
    worksheet.write(1, 5, 7).context("template row")?;

    // Example doubles row with a gender override and a birthdate override
    worksheet.write(2, 0, "AAAAAA").context("template row")?;
    worksheet.write(2, 1, "BBBBBB").context("template row")?;
    worksheet.write(2, 2, "CCCCCC").context("template row")?;
    worksheet.write(2, 3, "DDDDDD").context("template row")?;
    worksheet.write(2, 4, 11).context("template row")?;
    worksheet.write(2, 5, 9).context("template row")?;
    worksheet.write(2, 7, "F").context("template row")?;
    worksheet.write(2, 10, "1990-04-12").context("template row")?;

    workbook
        .save_to_buffer()
        .context("Failed to serialize template workbook")
}
