//! Dashboard selectors, page titles and page scripts.

pub const TITLE_SIGN_IN: &str = "Amazon Sign-In";
pub const TITLE_TWO_STEP: &str = "Two-Step Verification";

// Sign-in
pub const EMAIL_INPUT: &str = "#ap_email";
pub const PASSWORD_INPUT: &str = "#ap_password";
pub const CAPTCHA_IMAGE: &str = "#auth-captcha-image";
pub const CAPTCHA_GUESS: &str = "#auth-captcha-guess";
pub const SIGN_IN_SUBMIT: &str = "#signInSubmit";

// Two-step verification
pub const OTP_SEND_CODE: &str = "#auth-send-code";
pub const OTP_SEND_LIMIT_ALERT: &str =
    "#auth-error-message-box div.a-alert-container h4.a-alert-heading";
pub const OTP_CODE_INPUT: &str = "#auth-mfa-otpcode";
pub const OTP_SUBMIT: &str = "#auth-signin-button";

// Account switcher
pub const SWITCHER: &str = "#sc-mkt-switcher";
pub const SWITCHER_BUTTON: &str = "#sc-mkt-switcher button.dropdown-button";
pub const SWITCHER_CHECKBOX: &str = "input[type=\"checkbox\"]";
pub const PARTNER_SWITCHER: &str = "#partner-switcher";
pub const ATTR_MERCHANT_SELECTION: &str = "data-merchant_selection";
pub const ATTR_MARKETPLACE_SELECTION: &str = "data-marketplace_selection";
pub const ATTR_PARTNER_SELECTION: &str = "data-partner_selection";
pub const MERCHANT_ID_PREFIX: &str = "amzn1.merchant.o.";
pub const PARTNER_ID_PREFIX: &str = "amzn1.pa.o.";

// Reports
pub const DATA_TABLE: &str = "table#dataTable";
pub const FROM_DATE: &str = "#fromDate2";
pub const TO_DATE: &str = "#toDate2";
pub const EXPORT_CONTROL: &str = "div#export";
pub const DOWNLOAD_CSV: &str = "span#downloadCSV";

/// Link opening a report's detail view.
pub fn report_link(report_id: &str) -> String {
    format!("a#report_{report_id}")
}

/// Marker telling whether a report is offered for the live account.
pub fn report_marker(report_id: &str) -> String {
    format!("#report_{report_id}")
}

/// Market anchor inside an account's switcher group. Requires
/// [`REVEAL_SWITCHER_SCRIPT`] to have tagged the group ids.
pub fn market_anchor(account_id: &str, market_id: &str) -> String {
    format!("#merchant_{account_id} a#{market_id}")
}

/// Forces the switcher menu open and tags each account group with a
/// `merchant_<id>` element id so market anchors can be addressed.
pub const REVEAL_SWITCHER_SCRIPT: &str = r#"(() => {
    const menu = document.querySelector('#sc-navbar-container .dropdown-content');
    if (menu) { menu.style.display = 'block'; }
    document.querySelectorAll('#sc-navbar-container .merchant-level')
        .forEach(e => e.style.display = 'block');
    document.querySelectorAll('input[type="checkbox"]')
        .forEach(c => c.parentElement.setAttribute('id',
            (c.getAttribute('id') || '').replace('amzn1.pa.o.', 'merchant_')));
    document.querySelectorAll('.partner-label')
        .forEach(l => l.setAttribute('id',
            (l.getAttribute('for') || '').replace('amzn1.pa.o.', 'merchant_label_')));
    return null;
})()"#;

/// Lists switcher groups as `[{id, name, markets: [..]}]`.
pub const CATALOG_SCRIPT: &str = r#"(() => Array.from(document.querySelectorAll('.partner-level'))
    .map(item => ({
        id: (item.querySelector('input').getAttribute('id') || '').replace('amzn1.pa.o.', ''),
        name: (item.querySelector('label.partner-label') || {}).innerHTML || '',
        markets: Array.from(item.querySelectorAll('a')).map(a => a.getAttribute('id')),
    })))()"#;

/// Forces the export dropdown open.
pub const SHOW_EXPORT_MENU_SCRIPT: &str = r#"(() => {
    const menu = document.querySelector('div#export ul.actionsDDsub');
    if (menu) { menu.style.display = 'block'; }
    return null;
})()"#;

/// Returns the export dropdown's `style.display`.
pub const EXPORT_MENU_DISPLAY_SCRIPT: &str = r#"(() => {
    const menu = document.querySelector('div#export ul.actionsDDsub');
    return menu ? menu.style.display : null;
})()"#;
