//! Postgres-backed employee directory.
//!
//! The directory trait is synchronous (it is called from job executor
//! threads), so queries run on the tokio runtime captured at construction via
//! `Handle::block_on`. Calling the trait methods from inside an async task on
//! that runtime is not supported; HTTP handlers go through
//! `tokio::task::spawn_blocking`.
//!
//! Email uniqueness is enforced by a unique index, so concurrent creates
//! cannot both win.

use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tokio::runtime::Handle;
use tracing::instrument;
use uuid::Uuid;

use payrun_core::EmployeeId;
use payrun_payroll::{Employee, EmployeeStatus, EmployeeUpdate, PayrollFilters};

use super::{DepartmentCount, DirectoryError, EmployeeDirectory, EmployeePage, EmployeeQuery};

const EMPLOYEE_COLUMNS: &str =
    "id, first_name, last_name, email, department, job_title, base_salary, status";

const LIST_FILTER: &str = r#"
    ($1::TEXT IS NULL OR department = $1)
    AND ($2::TEXT IS NULL OR status = $2)
    AND ($3::TEXT IS NULL OR first_name ILIKE $3 OR last_name ILIKE $3 OR email ILIKE $3)
"#;

#[derive(Debug, Clone)]
pub struct PostgresEmployeeDirectory {
    pool: PgPool,
    runtime: Handle,
}

impl PostgresEmployeeDirectory {
    /// Must be called from within a tokio runtime.
    pub fn new(pool: PgPool) -> Result<Self, DirectoryError> {
        let runtime = Handle::try_current().map_err(|_| {
            DirectoryError::Unavailable(
                "PostgresEmployeeDirectory requires a tokio runtime".to_string(),
            )
        })?;
        Ok(Self { pool, runtime })
    }

    pub async fn connect(database_url: &str) -> Result<Self, DirectoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;
        Self::new(pool)
    }

    /// Create the `employees` table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<(), DirectoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS employees (
                id           UUID PRIMARY KEY,
                first_name   TEXT NOT NULL,
                last_name    TEXT NOT NULL,
                email        TEXT NULL,
                department   TEXT NOT NULL,
                job_title    TEXT NOT NULL DEFAULT '',
                base_salary  BIGINT NOT NULL,
                status       TEXT NOT NULL DEFAULT 'active'
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| DirectoryError::Query(e.to_string()))?;

        sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS employees_email_key ON employees (email)")
            .execute(&self.pool)
            .await
            .map_err(|e| DirectoryError::Query(e.to_string()))?;
        Ok(())
    }

    pub async fn ping(&self) -> Result<(), DirectoryError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))
    }

    #[instrument(skip(self), err)]
    pub async fn fetch_eligible(
        &self,
        filters: &PayrollFilters,
    ) -> Result<Vec<Employee>, DirectoryError> {
        let ids: Option<Vec<Uuid>> = filters
            .employee_ids()
            .map(|ids| ids.iter().map(|id| *id.as_uuid()).collect());

        let rows = sqlx::query(
            r#"
            SELECT id, first_name, last_name, email, department, job_title, base_salary, status
            FROM employees
            WHERE status = 'active'
              AND ($1::TEXT IS NULL OR department = $1)
              AND ($2::UUID[] IS NULL OR id = ANY($2))
            ORDER BY last_name ASC, first_name ASC, id ASC
            "#,
        )
        .bind(filters.department())
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DirectoryError::Query(e.to_string()))?;

        rows.iter().map(employee_from_row).collect()
    }

    #[instrument(skip(self), err)]
    pub async fn fetch_page(&self, query: &EmployeeQuery) -> Result<EmployeePage, DirectoryError> {
        let status = query.status.map(|s| s.as_str());
        let search = query.search.as_deref().map(like_pattern);
        let offset = i64::try_from(query.offset()).unwrap_or(i64::MAX);

        let total_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM employees WHERE {LIST_FILTER}"
        ))
        .bind(query.department.as_deref())
        .bind(status)
        .bind(search.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DirectoryError::Query(e.to_string()))?;

        let rows = sqlx::query(&format!(
            "SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE {LIST_FILTER} \
             ORDER BY last_name ASC, first_name ASC, id ASC LIMIT $4 OFFSET $5"
        ))
        .bind(query.department.as_deref())
        .bind(status)
        .bind(search.as_deref())
        .bind(i64::from(query.limit))
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DirectoryError::Query(e.to_string()))?;

        Ok(EmployeePage {
            employees: rows.iter().map(employee_from_row).collect::<Result<_, _>>()?,
            total_count: total_count.max(0) as u64,
        })
    }

    pub async fn fetch_one(&self, id: EmployeeId) -> Result<Option<Employee>, DirectoryError> {
        let row = sqlx::query(&format!("SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE id = $1"))
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DirectoryError::Query(e.to_string()))?;

        row.as_ref().map(employee_from_row).transpose()
    }

    #[instrument(skip(self, employee), fields(employee_id = %employee.id), err)]
    pub async fn insert(&self, employee: Employee) -> Result<Employee, DirectoryError> {
        sqlx::query(&format!(
            "INSERT INTO employees ({EMPLOYEE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
        ))
        .bind(*employee.id.as_uuid())
        .bind(&employee.first_name)
        .bind(&employee.last_name)
        .bind(employee.email.as_deref())
        .bind(&employee.department)
        .bind(&employee.job_title)
        .bind(employee.base_salary)
        .bind(employee.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, employee.email.as_deref()))?;

        Ok(employee)
    }

    /// Read-modify-write under a row lock.
    #[instrument(skip(self, update), err)]
    pub async fn apply_update(
        &self,
        id: EmployeeId,
        update: &EmployeeUpdate,
    ) -> Result<Option<Employee>, DirectoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;

        let row = sqlx::query(&format!(
            "SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE id = $1 FOR UPDATE"
        ))
        .bind(*id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| DirectoryError::Query(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut employee = employee_from_row(&row)?;
        update.apply(&mut employee);

        sqlx::query(
            r#"
            UPDATE employees
            SET first_name = $2, last_name = $3, email = $4, department = $5,
                job_title = $6, base_salary = $7, status = $8
            WHERE id = $1
            "#,
        )
        .bind(*employee.id.as_uuid())
        .bind(&employee.first_name)
        .bind(&employee.last_name)
        .bind(employee.email.as_deref())
        .bind(&employee.department)
        .bind(&employee.job_title)
        .bind(employee.base_salary)
        .bind(employee.status.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| write_error(e, employee.email.as_deref()))?;

        tx.commit()
            .await
            .map_err(|e| DirectoryError::Query(e.to_string()))?;
        Ok(Some(employee))
    }

    pub async fn fetch_department_stats(&self) -> Result<Vec<DepartmentCount>, DirectoryError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT department, COUNT(*) FROM employees GROUP BY department ORDER BY department ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DirectoryError::Query(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|(department, count)| DepartmentCount {
                department,
                count: count.max(0) as u64,
            })
            .collect())
    }
}

impl EmployeeDirectory for PostgresEmployeeDirectory {
    fn eligible(&self, filters: &PayrollFilters) -> Result<Vec<Employee>, DirectoryError> {
        self.runtime.block_on(self.fetch_eligible(filters))
    }

    fn list(&self, query: &EmployeeQuery) -> Result<EmployeePage, DirectoryError> {
        self.runtime.block_on(self.fetch_page(query))
    }

    fn get(&self, id: EmployeeId) -> Result<Option<Employee>, DirectoryError> {
        self.runtime.block_on(self.fetch_one(id))
    }

    fn create(&self, employee: Employee) -> Result<Employee, DirectoryError> {
        self.runtime.block_on(self.insert(employee))
    }

    fn update(
        &self,
        id: EmployeeId,
        update: &EmployeeUpdate,
    ) -> Result<Option<Employee>, DirectoryError> {
        self.runtime.block_on(self.apply_update(id, update))
    }

    fn department_stats(&self) -> Result<Vec<DepartmentCount>, DirectoryError> {
        self.runtime.block_on(self.fetch_department_stats())
    }
}

/// `%term%` with LIKE metacharacters escaped (Postgres' default escape is `\`).
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn write_error(e: sqlx::Error, email: Option<&str>) -> DirectoryError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            DirectoryError::DuplicateEmail(email.unwrap_or_default().to_string())
        }
        _ => DirectoryError::Query(e.to_string()),
    }
}

fn employee_from_row(row: &PgRow) -> Result<Employee, DirectoryError> {
    let column = |e: sqlx::Error| DirectoryError::Query(format!("bad employee row: {e}"));

    let status: String = row.try_get("status").map_err(column)?;
    let status = EmployeeStatus::parse(&status)
        .ok_or_else(|| DirectoryError::Query(format!("unknown employee status '{status}'")))?;

    Ok(Employee {
        id: EmployeeId::from_uuid(row.try_get("id").map_err(column)?),
        first_name: row.try_get("first_name").map_err(column)?,
        last_name: row.try_get("last_name").map_err(column)?,
        email: row.try_get("email").map_err(column)?,
        department: row.try_get("department").map_err(column)?,
        job_title: row.try_get("job_title").map_err(column)?,
        base_salary: row.try_get("base_salary").map_err(column)?,
        status,
    })
}
