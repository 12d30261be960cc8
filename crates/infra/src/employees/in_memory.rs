use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use payrun_core::EmployeeId;
use payrun_payroll::{Employee, EmployeeUpdate, PayrollFilters};

use super::{
    DepartmentCount, DirectoryError, EmployeeDirectory, EmployeePage, EmployeeQuery, payroll_order,
};

/// In-memory directory for tests/dev, optionally seeded from a JSON array.
/// Changes made through the directory are not written back to the seed file.
#[derive(Debug, Default)]
pub struct InMemoryEmployeeDirectory {
    employees: RwLock<Vec<Employee>>,
}

impl InMemoryEmployeeDirectory {
    pub fn new(employees: Vec<Employee>) -> Self {
        Self {
            employees: RwLock::new(employees),
        }
    }

    /// Load a JSON array of employee records.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, DirectoryError> {
        let path = path.as_ref();
        let seed_error = |reason: String| DirectoryError::Seed {
            path: path.display().to_string(),
            reason,
        };

        let bytes = std::fs::read(path).map_err(|e| seed_error(e.to_string()))?;
        let employees: Vec<Employee> =
            serde_json::from_slice(&bytes).map_err(|e| seed_error(e.to_string()))?;
        Ok(Self::new(employees))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<Employee>>, DirectoryError> {
        self.employees
            .read()
            .map_err(|_| DirectoryError::Unavailable("directory lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<Employee>>, DirectoryError> {
        self.employees
            .write()
            .map_err(|_| DirectoryError::Unavailable("directory lock poisoned".to_string()))
    }

    pub fn len(&self) -> usize {
        self.employees.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn email_taken(employees: &[Employee], email: &str, except: Option<EmployeeId>) -> bool {
    employees.iter().any(|e| {
        Some(e.id) != except
            && e
                .email
                .as_deref()
                .is_some_and(|existing| existing.eq_ignore_ascii_case(email))
    })
}

impl EmployeeDirectory for InMemoryEmployeeDirectory {
    fn eligible(&self, filters: &PayrollFilters) -> Result<Vec<Employee>, DirectoryError> {
        let employees = self.read()?;

        let mut eligible: Vec<Employee> = employees
            .iter()
            .filter(|e| filters.matches(e))
            .cloned()
            .collect();
        eligible.sort_by(payroll_order);
        Ok(eligible)
    }

    fn list(&self, query: &EmployeeQuery) -> Result<EmployeePage, DirectoryError> {
        let employees = self.read()?;

        let mut matching: Vec<&Employee> = employees.iter().filter(|e| query.matches(e)).collect();
        matching.sort_by(|a, b| payroll_order(a, b));

        let total_count = matching.len() as u64;
        let offset = usize::try_from(query.offset()).unwrap_or(usize::MAX);
        let employees = matching
            .into_iter()
            .skip(offset)
            .take(query.limit as usize)
            .cloned()
            .collect();

        Ok(EmployeePage {
            employees,
            total_count,
        })
    }

    fn get(&self, id: EmployeeId) -> Result<Option<Employee>, DirectoryError> {
        Ok(self.read()?.iter().find(|e| e.id == id).cloned())
    }

    fn create(&self, employee: Employee) -> Result<Employee, DirectoryError> {
        let mut employees = self.write()?;
        if let Some(email) = employee.email.as_deref() {
            if email_taken(&employees, email, None) {
                return Err(DirectoryError::DuplicateEmail(email.to_string()));
            }
        }
        employees.push(employee.clone());
        Ok(employee)
    }

    fn update(
        &self,
        id: EmployeeId,
        update: &EmployeeUpdate,
    ) -> Result<Option<Employee>, DirectoryError> {
        let mut employees = self.write()?;
        if let Some(email) = update.new_email() {
            if email_taken(&employees, email, Some(id)) {
                return Err(DirectoryError::DuplicateEmail(email.to_string()));
            }
        }

        Ok(employees.iter_mut().find(|e| e.id == id).map(|employee| {
            update.apply(employee);
            employee.clone()
        }))
    }

    fn department_stats(&self) -> Result<Vec<DepartmentCount>, DirectoryError> {
        let employees = self.read()?;
        let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
        for employee in employees.iter() {
            *counts.entry(employee.department.as_str()).or_default() += 1;
        }

        Ok(counts
            .into_iter()
            .map(|(department, count)| DepartmentCount {
                department: department.to_string(),
                count,
            })
            .collect())
    }
}
