mod common;

use anyhow::Result;
use common::{add_invoice, parse_date, signed_in_service};
use vetledger::application::AppError;
use vetledger::domain::{
    IncomeUpdate, MAX_AMOUNT_CENTS, NewExpense, NewPayment, PaymentMethod, PaymentStatus,
};

#[tokio::test]
async fn test_worked_example_summary() -> Result<()> {
    let (mut service, session, _temp) = signed_in_service().await?;
    let session = Some(&session);

    let invoice = add_invoice(&mut service, session.unwrap(), 100000, "2024-03-01").await?;
    assert_eq!(invoice.payment_status, PaymentStatus::Pending);

    let first = service
        .add_payment(session, NewPayment::new(invoice.id, 40000, parse_date("2024-03-05")))
        .await?;
    assert_eq!(first.status(), PaymentStatus::Partial);

    let second = service
        .add_payment(session, NewPayment::new(invoice.id, 60000, parse_date("2024-03-10")))
        .await?;
    assert_eq!(second.status(), PaymentStatus::Paid);

    service
        .add_expense(session, NewExpense::new("Medications", 15000, parse_date("2024-03-02")))
        .await?;
    service
        .add_expense(session, NewExpense::new("Rent", 50000, parse_date("2024-03-03")))
        .await?;

    let summary = service.summary();
    assert_eq!(summary.total_income, 100000);
    assert_eq!(summary.total_expenses, 65000);
    assert_eq!(summary.net_profit, 35000);
    assert_eq!(summary.outstanding_debt, 0);
    assert_eq!(summary.expenses_by_category["Medications"], 15000);
    assert_eq!(summary.expenses_by_category["Rent"], 50000);
    assert_eq!(summary.pending_invoices, 0);

    // Same figures after reloading from the database
    service.refresh(session, None, None).await?;
    assert_eq!(service.summary(), summary);

    Ok(())
}

#[tokio::test]
async fn test_outstanding_debt_with_partial_payment() -> Result<()> {
    let (mut service, session, _temp) = signed_in_service().await?;
    let s = Some(&session);

    let a = add_invoice(&mut service, &session, 100000, "2024-03-01").await?;
    let _b = add_invoice(&mut service, &session, 25000, "2024-03-02").await?;
    service
        .add_payment(s, NewPayment::new(a.id, 30000, parse_date("2024-03-04")))
        .await?;

    service.refresh(s, None, None).await?;
    let summary = service.summary();
    assert_eq!(summary.outstanding_debt, 70000 + 25000);
    assert_eq!(summary.pending_invoices, 2);
    assert_eq!(
        service.find_income(a.id).unwrap().payment_status,
        PaymentStatus::Partial
    );

    Ok(())
}

#[tokio::test]
async fn test_overpayment_marks_paid() -> Result<()> {
    let (mut service, session, _temp) = signed_in_service().await?;
    let s = Some(&session);

    let invoice = add_invoice(&mut service, &session, 50000, "2024-04-01").await?;
    let applied = service
        .add_payment(s, NewPayment::new(invoice.id, 80000, parse_date("2024-04-01")))
        .await?;

    assert_eq!(applied.status(), PaymentStatus::Paid);
    assert_eq!(service.summary().outstanding_debt, 0);

    Ok(())
}

#[tokio::test]
async fn test_check_payment_details_persist() -> Result<()> {
    let (mut service, session, _temp) = signed_in_service().await?;
    let s = Some(&session);

    let invoice = add_invoice(&mut service, &session, 120000, "2024-05-01").await?;
    let payment = NewPayment::new(invoice.id, 120000, parse_date("2024-05-02"))
        .with_check("CHK-0042", Some(parse_date("2024-06-01")));
    service.add_payment(s, payment).await?;

    service.refresh(s, None, None).await?;
    let stored = service.payments_for(invoice.id);
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].method, PaymentMethod::Check);
    assert_eq!(stored[0].check_number.as_deref(), Some("CHK-0042"));
    assert_eq!(stored[0].check_due_date, Some(parse_date("2024-06-01")));
    assert_eq!(stored[0].client_id, invoice.client_id);

    Ok(())
}

#[tokio::test]
async fn test_payment_to_unknown_invoice_is_rejected() -> Result<()> {
    let (mut service, session, _temp) = signed_in_service().await?;

    let result = service
        .add_payment(
            Some(&session),
            NewPayment::new(uuid::Uuid::new_v4(), 1000, parse_date("2024-01-01")),
        )
        .await;

    assert!(matches!(result, Err(AppError::InvoiceNotFound(_))));
    assert!(service.payments().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_date_range_filters_income_and_expenses_only() -> Result<()> {
    let (mut service, session, _temp) = signed_in_service().await?;
    let s = Some(&session);

    let march = add_invoice(&mut service, &session, 100000, "2024-03-15").await?;
    add_invoice(&mut service, &session, 40000, "2024-05-15").await?;
    service
        .add_expense(s, NewExpense::new("Rent", 20000, parse_date("2024-03-01")))
        .await?;
    service
        .add_expense(s, NewExpense::new("Rent", 20000, parse_date("2024-04-01")))
        .await?;
    // Payment dated after the range still counts against the March invoice
    service
        .add_payment(s, NewPayment::new(march.id, 30000, parse_date("2024-06-01")))
        .await?;

    service
        .refresh(s, Some(parse_date("2024-03-01")), Some(parse_date("2024-03-31")))
        .await?;

    assert_eq!(service.income().len(), 1);
    assert_eq!(service.expenses().len(), 1);
    assert_eq!(service.payments().len(), 1);

    let summary = service.summary();
    assert_eq!(summary.total_income, 100000);
    assert_eq!(summary.total_expenses, 20000);
    assert_eq!(summary.outstanding_debt, 70000);

    Ok(())
}

#[tokio::test]
async fn test_lists_are_newest_first() -> Result<()> {
    let (mut service, session, _temp) = signed_in_service().await?;
    let s = Some(&session);

    add_invoice(&mut service, &session, 1000, "2024-01-10").await?;
    add_invoice(&mut service, &session, 2000, "2024-03-10").await?;
    add_invoice(&mut service, &session, 3000, "2024-02-10").await?;

    service.refresh(s, None, None).await?;
    let dates: Vec<String> = service
        .income()
        .iter()
        .map(|r| r.income_date.to_string())
        .collect();
    assert_eq!(dates, vec!["2024-03-10", "2024-02-10", "2024-01-10"]);

    Ok(())
}

#[tokio::test]
async fn test_update_income_keeps_status() -> Result<()> {
    let (mut service, session, _temp) = signed_in_service().await?;
    let s = Some(&session);

    let invoice = add_invoice(&mut service, &session, 100000, "2024-03-01").await?;
    service
        .add_payment(s, NewPayment::new(invoice.id, 100000, parse_date("2024-03-02")))
        .await?;

    let updated = service
        .update_income(
            s,
            invoice.id,
            IncomeUpdate {
                amount_cents: Some(150000),
                description: Some("Surgery".into()),
                ..Default::default()
            },
        )
        .await?;

    assert_eq!(updated.amount_cents, 150000);
    assert_eq!(updated.description, "Surgery");
    assert_eq!(updated.payment_status, PaymentStatus::Paid);

    Ok(())
}

#[tokio::test]
async fn test_resync_after_amount_increase_does_not_lower_status() -> Result<()> {
    let (mut service, session, _temp) = signed_in_service().await?;
    let s = Some(&session);

    let invoice = add_invoice(&mut service, &session, 50000, "2024-03-01").await?;
    service
        .add_payment(s, NewPayment::new(invoice.id, 50000, parse_date("2024-03-02")))
        .await?;
    service
        .update_income(
            s,
            invoice.id,
            IncomeUpdate {
                amount_cents: Some(90000),
                ..Default::default()
            },
        )
        .await?;

    let resynced = service.resync_status(s, invoice.id).await?;
    assert_eq!(resynced.payment_status, PaymentStatus::Paid);

    Ok(())
}

#[tokio::test]
async fn test_delete_income_removes_its_payments() -> Result<()> {
    let (mut service, session, _temp) = signed_in_service().await?;
    let s = Some(&session);

    let invoice = add_invoice(&mut service, &session, 100000, "2024-03-01").await?;
    service
        .add_payment(s, NewPayment::new(invoice.id, 10000, parse_date("2024-03-02")))
        .await?;

    service.delete_income(s, invoice.id).await?;
    service.refresh(s, None, None).await?;
    assert!(service.income().is_empty());
    assert!(service.payments().is_empty());

    let again = service.delete_income(s, invoice.id).await;
    assert!(matches!(again, Err(AppError::IncomeRecordNotFound(_))));

    Ok(())
}

#[tokio::test]
async fn test_delete_expense() -> Result<()> {
    let (mut service, session, _temp) = signed_in_service().await?;
    let s = Some(&session);

    let expense = service
        .add_expense(
            s,
            NewExpense::new("Equipment", 250000, parse_date("2024-02-01"))
                .with_supplier("VetSupply")
                .with_invoice_number("INV-7"),
        )
        .await?;

    service.refresh(s, None, None).await?;
    assert_eq!(service.expenses()[0].supplier.as_deref(), Some("VetSupply"));

    service.delete_expense(s, expense.id).await?;
    assert!(service.expenses().is_empty());
    assert!(matches!(
        service.delete_expense(s, expense.id).await,
        Err(AppError::ExpenseNotFound(_))
    ));

    Ok(())
}

#[tokio::test]
async fn test_monthly_report_from_database() -> Result<()> {
    let (mut service, session, _temp) = signed_in_service().await?;
    let s = Some(&session);

    add_invoice(&mut service, &session, 20000, "2024-01-05").await?;
    add_invoice(&mut service, &session, 30000, "2024-02-05").await?;
    add_invoice(&mut service, &session, 15000, "2024-02-20").await?;

    service.refresh(s, None, None).await?;
    let report = service.monthly_income(parse_date("2024-02-28"), 6);

    assert_eq!(report.months.len(), 6);
    assert_eq!(report.this_month, 45000);
    assert_eq!(report.last_month, 20000);
    assert_eq!(report.change_percent, 125.0);
    assert_eq!(report.all_time, 65000);

    Ok(())
}

#[tokio::test]
async fn test_payments_only_leave_with_their_invoice() -> Result<()> {
    let (mut service, session, _temp) = signed_in_service().await?;
    let s = Some(&session);

    let invoice = add_invoice(&mut service, &session, 50000, "2024-03-01").await?;
    service
        .add_payment(s, NewPayment::new(invoice.id, 50000, parse_date("2024-03-02")))
        .await?;
    let expense = service
        .add_expense(s, NewExpense::new("Rent", 50000, parse_date("2024-03-02")))
        .await?;

    service.delete_expense(s, expense.id).await?;
    service.refresh(s, None, None).await?;
    assert_eq!(service.payments_for(invoice.id).len(), 1);
    assert_eq!(
        service.find_income(invoice.id).unwrap().payment_status,
        PaymentStatus::Paid
    );

    service.delete_income(s, invoice.id).await?;
    service.refresh(s, None, None).await?;
    assert!(service.payments().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_update_can_set_and_clear_notes() -> Result<()> {
    let (mut service, session, _temp) = signed_in_service().await?;
    let s = Some(&session);

    let invoice = add_invoice(&mut service, &session, 10000, "2024-03-01").await?;

    let noted = service
        .update_income(
            s,
            invoice.id,
            IncomeUpdate {
                notes: Some("Follow-up in two weeks".into()),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(noted.notes.as_deref(), Some("Follow-up in two weeks"));

    // Leaving notes out keeps them
    let kept = service
        .update_income(
            s,
            invoice.id,
            IncomeUpdate {
                description: Some("Vaccination".into()),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(kept.notes.as_deref(), Some("Follow-up in two weeks"));

    let cleared = service
        .update_income(
            s,
            invoice.id,
            IncomeUpdate {
                notes: Some(String::new()),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(cleared.notes, None);

    service.refresh(s, None, None).await?;
    assert_eq!(service.find_income(invoice.id).unwrap().notes, None);

    Ok(())
}

#[tokio::test]
async fn test_oversized_amounts_are_rejected() -> Result<()> {
    let (mut service, session, _temp) = signed_in_service().await?;
    let s = Some(&session);

    let invoice = add_invoice(&mut service, &session, MAX_AMOUNT_CENTS, "2024-03-01").await?;
    let result = service
        .add_payment(
            s,
            NewPayment::new(invoice.id, MAX_AMOUNT_CENTS + 1, parse_date("2024-03-02")),
        )
        .await;
    assert!(matches!(result, Err(AppError::InvalidAmount(_))));

    let result = service
        .update_income(
            s,
            invoice.id,
            IncomeUpdate {
                amount_cents: Some(i64::MAX),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(result, Err(AppError::InvalidAmount(_))));
    assert!(service.payments().is_empty());

    Ok(())
}
