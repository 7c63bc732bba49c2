use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl Pagination {
    /// `(limit, offset)` with pages numbered from 1.
    pub fn window(&self, default_limit: i64) -> (i64, i64) {
        let limit = self.limit.filter(|l| *l > 0).unwrap_or(default_limit).min(100);
        let page = self.page.filter(|p| *p > 0).unwrap_or(1);
        (limit, (page - 1) * limit)
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub count: i64,
    pub results: Vec<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_defaults_and_clamps() {
        assert_eq!(Pagination::default().window(6), (6, 0));
        let p = Pagination { page: Some(3), limit: Some(10) };
        assert_eq!(p.window(6), (10, 20));
        let p = Pagination { page: Some(0), limit: Some(-1) };
        assert_eq!(p.window(6), (6, 0));
        let p = Pagination { page: None, limit: Some(1000) };
        assert_eq!(p.window(6), (100, 0));
    }
}
