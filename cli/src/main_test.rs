use super::*;

#[test]
fn line_item_parses_from_the_right() {
    let item = parse_line_item("Logo: final cut:2:25000").unwrap();
    assert_eq!(item.description, "Logo: final cut");
    assert_eq!(item.quantity, 2);
    assert_eq!(item.unit_price, 25_000);
}

#[test]
fn line_item_rejects_bad_input() {
    assert!(parse_line_item("Design:2").is_err());
    assert!(parse_line_item("Design:two:100").is_err());
    assert!(parse_line_item("Design:2:1.50").is_err());
}

#[test]
fn minor_units_render_with_two_decimals() {
    assert_eq!(format_minor(150_000), "1500.00");
    assert_eq!(format_minor(5), "0.05");
    assert_eq!(format_minor(-1234), "-12.34");
}

#[test]
fn cli_parses_invoice_create() {
    let cli = Cli::try_parse_from([
        "paydesk",
        "invoice",
        "create",
        "--customer-name",
        "Kemi",
        "--customer-email",
        "kemi@example.com",
        "--due-date",
        "2026-11-30",
        "--item",
        "Design:2:25000",
        "--item",
        "Hosting:1:10000",
    ])
    .unwrap();
    let Command::Invoice(InvoiceCommand { command: InvoiceSubcommand::Create { items, .. } }) = cli.command else {
        panic!("expected invoice create");
    };
    assert_eq!(items.len(), 2);
}
