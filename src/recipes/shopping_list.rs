//! Shopping list aggregation and rendering.

use std::collections::HashMap;

use super::repo_types::{IngredientTotal, RecipeIngredient};

pub const CLOSING_LINE: &str = "Happy shopping!";

/// Groups ingredient lines by `(name, unit)` and sums their amounts. Groups
/// keep the order in which they first appear.
pub fn aggregate(lines: &[RecipeIngredient]) -> Vec<IngredientTotal> {
    let mut index: HashMap<(&str, &str), usize> = HashMap::new();
    let mut totals: Vec<IngredientTotal> = Vec::new();
    for line in lines {
        let key = (line.name.as_str(), line.measurement_unit.as_str());
        match index.get(&key) {
            Some(&i) => totals[i].amount += i64::from(line.amount),
            None => {
                index.insert(key, totals.len());
                totals.push(IngredientTotal {
                    name: line.name.clone(),
                    measurement_unit: line.measurement_unit.clone(),
                    amount: i64::from(line.amount),
                });
            }
        }
    }
    totals
}

/// One `"<name>: <amount> <unit>"` line per group, then a blank line and the
/// closing line. An empty list renders as the closing line alone.
pub fn render(totals: &[IngredientTotal]) -> String {
    if totals.is_empty() {
        return CLOSING_LINE.to_string();
    }
    let mut out = totals
        .iter()
        .map(|t| format!("{}: {} {}", t.name, t.amount, t.measurement_unit))
        .collect::<Vec<_>>()
        .join("\n");
    out.push_str("\n\n");
    out.push_str(CLOSING_LINE);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(id: i64, name: &str, unit: &str, amount: i32) -> RecipeIngredient {
        RecipeIngredient {
            id,
            name: name.into(),
            measurement_unit: unit.into(),
            amount,
        }
    }

    #[test]
    fn same_ingredient_across_recipes_is_summed() {
        let totals = aggregate(&[line(1, "Salt", "g", 5), line(1, "Salt", "g", 10)]);
        assert_eq!(totals.len(), 1);
        let doc = render(&totals);
        assert!(doc.lines().any(|l| l == "Salt: 15 g"));
    }

    #[test]
    fn unit_is_part_of_the_group_key() {
        let totals = aggregate(&[line(1, "Milk", "ml", 200), line(2, "Milk", "cup", 1)]);
        assert_eq!(totals.len(), 2);
    }

    #[test]
    fn groups_keep_first_occurrence_order() {
        let totals = aggregate(&[
            line(2, "Sugar", "g", 3),
            line(1, "Salt", "g", 5),
            line(2, "Sugar", "g", 4),
        ]);
        let names: Vec<&str> = totals.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["Sugar", "Salt"]);
        assert_eq!(totals[0].amount, 7);
    }

    #[test]
    fn empty_cart_renders_only_the_closing_line() {
        assert_eq!(render(&aggregate(&[])), CLOSING_LINE);
    }

    #[test]
    fn two_recipe_cart_document() {
        // recipe A: salt 5 g, sugar 3 g; recipe B: salt 10 g
        let lines = [
            line(1, "Salt", "g", 5),
            line(2, "Sugar", "g", 3),
            line(1, "Salt", "g", 10),
        ];
        let doc = render(&aggregate(&lines));
        let rows: Vec<&str> = doc.lines().collect();
        assert!(rows.contains(&"Salt: 15 g"));
        assert!(rows.contains(&"Sugar: 3 g"));
        assert_eq!(rows.last(), Some(&CLOSING_LINE));
        assert_eq!(rows.iter().filter(|r| r.contains(':')).count(), 2);
    }

    #[test]
    fn large_sums_do_not_overflow_i32() {
        let totals = aggregate(&[line(1, "Water", "ml", i32::MAX), line(1, "Water", "ml", 1)]);
        assert_eq!(totals[0].amount, i64::from(i32::MAX) + 1);
    }
}
