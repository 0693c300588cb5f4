use crate::core::Result;
use crate::merge::QueryResult;
use crate::rule::EncryptRule;

/// Decrypts the encrypted columns of `table` in place. Columns are matched by
/// their logical names, which encrypted projections are aliased to.
///
/// Only rows read through cipher columns should be passed here; plain column
/// reads are already plaintext.
pub fn decrypt_result(rule: &EncryptRule, table: &str, result: &mut QueryResult) -> Result<()> {
    decrypt_result_with(rule, table, result, &[])
}

/// Like [`decrypt_result`], but `aliases` maps result column labels to the
/// logical columns they were selected from, e.g. `("p", "pwd")` for
/// `SELECT pwd AS p`. Labels not listed are matched by their own name.
pub fn decrypt_result_with(
    rule: &EncryptRule,
    table: &str,
    result: &mut QueryResult,
    aliases: &[(&str, &str)],
) -> Result<()> {
    let encrypted: Vec<(usize, &str)> = result
        .columns
        .iter()
        .enumerate()
        .filter_map(|(i, label)| {
            let logic = aliases
                .iter()
                .find(|(alias, _)| alias.eq_ignore_ascii_case(label))
                .map(|&(_, logic)| logic)
                .unwrap_or(label.as_str());
            rule.find_column(table, logic).map(|_| (i, logic))
        })
        .collect();
    if encrypted.is_empty() {
        return Ok(());
    }

    let mut decrypted_rows = Vec::with_capacity(result.rows.len());
    for row in &result.rows {
        let mut decrypted = row.clone();
        for &(i, column) in &encrypted {
            if let Some(value) = row.get(i) {
                decrypted[i] = rule.decrypt_value(table, column, value)?;
            }
        }
        decrypted_rows.push(decrypted);
    }
    result.rows = decrypted_rows;
    Ok(())
}
