//! Payslip documents written to the local filesystem.
//!
//! Each payslip is a single A4 PDF page set in Courier, laid out from the
//! same text rendering used in logs and tests.

use std::fmt::Write as _;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::Utc;
use printpdf::{BuiltinFont, Mm, PdfDocument};
use thiserror::Error;
use tracing::debug;

use payrun_core::EmployeeId;
use payrun_payroll::{PayPeriod, PayrollCalculationResult, format_minor_units};

/// A generated payslip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayslipArtifact {
    pub employee_id: EmployeeId,
    pub pay_period: PayPeriod,
    pub file_name: String,
    /// `payslips/<file_name>`
    pub file_reference: String,
}

#[derive(Debug, Error)]
pub enum PayslipError {
    #[error("failed to write payslip {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid payslip file name: {0}")]
    InvalidFileName(String),
    #[error("failed to render payslip pdf: {0}")]
    Render(String),
}

/// Renders and stores one payslip per calculation result.
pub trait PayslipGenerator: Send + Sync {
    fn generate(&self, result: &PayrollCalculationResult) -> Result<PayslipArtifact, PayslipError>;

    /// Read a previously generated payslip by file name. `Ok(None)` if absent.
    fn read(&self, file_name: &str) -> Result<Option<Vec<u8>>, PayslipError>;
}

/// `payslip_<employee_id>_<start>_<end>.pdf`
pub fn payslip_file_name(employee_id: EmployeeId, pay_period: &PayPeriod) -> String {
    format!("payslip_{}_{}.pdf", employee_id, pay_period.file_stem())
}

/// Media type for a stored payslip, by extension.
pub fn content_type(file_name: &str) -> &'static str {
    if file_name.ends_with(".pdf") {
        "application/pdf"
    } else {
        "text/plain; charset=utf-8"
    }
}

/// A bare file name: no separators, no parent references.
pub fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
        && !name.starts_with('.')
}

/// Text layout of a payslip, one line per printed row.
pub fn render_payslip(result: &PayrollCalculationResult) -> String {
    let money = |amount: i64| format_minor_units(amount, &result.currency);
    let mut out = String::new();

    let _ = writeln!(out, "PAYSLIP");
    let _ = writeln!(out, "{}", "=".repeat(48));
    let _ = writeln!(out, "Pay Period: {}", result.pay_period);
    let _ = writeln!(out);
    let _ = writeln!(out, "Employee:    {}", result.employee_name);
    let _ = writeln!(out, "Employee ID: {}", result.employee_id);
    let _ = writeln!(out);
    let _ = writeln!(out, "EARNINGS");
    let _ = writeln!(out, "  Gross Salary:        {:>16}", money(result.gross_salary));
    let _ = writeln!(out);
    let _ = writeln!(out, "DEDUCTIONS");
    let _ = writeln!(out, "  Tax:                 {:>16}", money(result.deductions.tax));
    let _ = writeln!(
        out,
        "  Health Insurance:    {:>16}",
        money(result.deductions.health_insurance)
    );
    let _ = writeln!(
        out,
        "  401(k) Retirement:   {:>16}",
        money(result.deductions.retirement_401k)
    );
    let _ = writeln!(out, "  Total Deductions:    {:>16}", money(result.deductions.total));
    let _ = writeln!(out);
    let _ = writeln!(out, "NET PAY:               {:>16}", money(result.net_salary));
    let _ = writeln!(out, "{}", "=".repeat(48));
    let _ = writeln!(out, "Generated on {}", Utc::now().format("%Y-%m-%d %H:%M:%S UTC"));
    out
}

const PAGE_WIDTH: Mm = Mm(210.0);
const PAGE_HEIGHT: Mm = Mm(297.0);
const MARGIN: f32 = 20.0;
const FONT_SIZE: f32 = 11.0;
const LINE_HEIGHT: f32 = 6.0;

/// Render the payslip as a one-page PDF.
pub fn render_payslip_pdf(result: &PayrollCalculationResult) -> Result<Vec<u8>, PayslipError> {
    let render_error = |e: printpdf::Error| PayslipError::Render(e.to_string());

    let title = format!("Payslip {} {}", result.employee_name, result.pay_period);
    let (doc, page, layer) = PdfDocument::new(title, PAGE_WIDTH, PAGE_HEIGHT, "payslip");
    let font = doc.add_builtin_font(BuiltinFont::Courier).map_err(render_error)?;
    let layer = doc.get_page(page).get_layer(layer);

    let top = PAGE_HEIGHT.0 - MARGIN;
    for (row, line) in render_payslip(result).lines().enumerate() {
        let y = top - row as f32 * LINE_HEIGHT;
        layer.use_text(line, FONT_SIZE, Mm(MARGIN), Mm(y), &font);
    }

    doc.save_to_bytes().map_err(render_error)
}

/// Write `contents` to `path` via a sibling temp file and `rename`, so
/// readers never observe a partial file.
pub(crate) fn write_atomically(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::now_v7().simple()));
    let result = (|| {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Filesystem payslip generator rooted at a directory.
#[derive(Debug, Clone)]
pub struct FsPayslipGenerator {
    dir: PathBuf,
}

impl FsPayslipGenerator {
    /// Create the generator, creating `dir` if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, PayslipError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| PayslipError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl PayslipGenerator for FsPayslipGenerator {
    fn generate(&self, result: &PayrollCalculationResult) -> Result<PayslipArtifact, PayslipError> {
        let file_name = payslip_file_name(result.employee_id, &result.pay_period);
        let path = self.dir.join(&file_name);

        let pdf = render_payslip_pdf(result)?;
        write_atomically(&path, &pdf)
            .map_err(|source| PayslipError::Io { path: path.clone(), source })?;
        debug!(employee_id = %result.employee_id, path = %path.display(), "payslip written");

        Ok(PayslipArtifact {
            employee_id: result.employee_id,
            pay_period: result.pay_period,
            file_reference: format!("payslips/{file_name}"),
            file_name,
        })
    }

    fn read(&self, file_name: &str) -> Result<Option<Vec<u8>>, PayslipError> {
        if !is_safe_file_name(file_name) {
            return Err(PayslipError::InvalidFileName(file_name.to_string()));
        }
        let path = self.dir.join(file_name);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(PayslipError::Io { path, source }),
        }
    }
}
