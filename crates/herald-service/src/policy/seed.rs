//! Policies shipped with the engine for the ERP's built-in events.

use herald_core::config::PolicyConfig;

#[allow(clippy::too_many_arguments)]
fn entry(
    key: &str,
    mandatory: &[&str],
    optional: &[&str],
    importance: &str,
    audience: &str,
    title: &str,
    body: &str,
    action_url: Option<&str>,
    required: &[&str],
) -> PolicyConfig {
    let owned = |list: &[&str]| list.iter().map(|s| s.to_string()).collect();
    PolicyConfig {
        key: key.to_string(),
        mandatory_channels: owned(mandatory),
        optional_channels: owned(optional),
        importance: Some(importance.to_string()),
        audience: Some(audience.to_string()),
        title: Some(title.to_string()),
        body: Some(body.to_string()),
        action_url: action_url.map(str::to_string),
        required_fields: owned(required),
    }
}

/// The seeded policy table, in configuration form.
pub fn seeded_policies() -> Vec<PolicyConfig> {
    vec![
        entry(
            "item.out_of_stock",
            &["in_app", "push", "whatsapp"],
            &["email"],
            "high",
            "role:stock_manager",
            "{item} is out of stock",
            "{item} has no units left in stock.",
            Some("/inventory/items/{item_id}"),
            &["item", "item_id"],
        ),
        entry(
            "item.low_stock",
            &["in_app"],
            &["push", "email"],
            "normal",
            "role:stock_manager",
            "{item} is running low",
            "{item} is down to {quantity} units.",
            Some("/inventory/items/{item_id}"),
            &["item", "item_id", "quantity"],
        ),
        entry(
            "task.overdue",
            &["in_app", "push"],
            &["email", "whatsapp"],
            "high",
            "assignees",
            "Task overdue: {task}",
            "The task {task} was due on {due_date}.",
            Some("/tasks/{task_id}"),
            &["task", "task_id", "due_date"],
        ),
        entry(
            "task.assigned",
            &["in_app"],
            &["push", "email"],
            "normal",
            "assignees",
            "New task: {task}",
            "You were assigned to {task}.",
            Some("/tasks/{task_id}"),
            &["task", "task_id"],
        ),
        entry(
            "borrow.unreturned",
            &["in_app", "whatsapp"],
            &["push", "email"],
            "high",
            "explicit",
            "Borrowed item not returned",
            "{item} borrowed on {borrowed_at} has not been returned.",
            None,
            &["item", "borrowed_at"],
        ),
        entry(
            "vacation.approved",
            &["in_app", "email"],
            &["push"],
            "normal",
            "explicit",
            "Vacation approved",
            "Your vacation from {start} to {end} was approved.",
            Some("/hr/vacations"),
            &["start", "end"],
        ),
        entry(
            "payroll.available",
            &["in_app"],
            &["email", "push", "sms"],
            "normal",
            "explicit",
            "Payslip available",
            "Your payslip for {period} is available.",
            Some("/hr/payslips"),
            &["period"],
        ),
        entry(
            "ppe.delivery_pending",
            &["in_app"],
            &["push", "whatsapp"],
            "high",
            "sector:safety",
            "PPE delivery pending",
            "{employee} is waiting for {equipment}.",
            Some("/safety/ppe"),
            &["employee", "equipment"],
        ),
    ]
}
