//! Account and order notification emails.
//!
//! Messages are built here and queued as `send_mail` tasks; nothing is sent from the
//! request path.

use rust_decimal::Decimal;

use crate::api::models::money;
use crate::db::models::orders::OrderDBResponse;
use crate::db::models::users::UserDBResponse;
use crate::tasks::TaskKind;

pub fn registration(username: &str, email: &str, password: &str) -> TaskKind {
    let message = format!(
        "Hello {username},\n\n\
         Your account is successfully registered and the information is as follows:\n\n\
         Username: {username}\n\
         Email: {email}\n\
         Generated Password: {password}\n\n\
         This is an auto-generated password. Please change it after logging in.\n\n\
         Thank you!"
    );
    TaskKind::SendMail {
        subject: "Your Account Information".to_string(),
        message,
        recipients: vec![email.to_string()],
    }
}

pub fn order_confirmation(customer: &UserDBResponse, order: &OrderDBResponse) -> TaskKind {
    let message = format!(
        "Hello {username},\n\n\
         Thank you for placing an order with us! Your order details are as follows:\n\n\
         Order ID: {id}\n\
         Total Amount: ${total}\n\n\
         We will send you another email once your order is ready for delivery.\n\n\
         To verify your order for Order ID: {id}, please use the following OTP:\n\n\
         OTP: {otp}\n\n\
         Please provide this OTP to the delivery agent during the delivery process.\n\n\
         Regards,\n\
         Swiggy",
        username = customer.username,
        id = order.id,
        total = amount(order.total_amount),
        otp = order.otp,
    );
    TaskKind::SendMail {
        subject: "Order Confirmation".to_string(),
        message,
        recipients: vec![customer.email.clone()],
    }
}

/// Sent to the customer, and to the delivery agent when one is assigned.
pub fn order_cancellation(customer: &UserDBResponse, agent: Option<&UserDBResponse>, order: &OrderDBResponse) -> TaskKind {
    let message = format!(
        "Hello {username},\n\n\
         We regret to inform you that your order with Order ID: {id} has been canceled.\n\
         Total Amount: ${total}\n\n\
         If you have any concerns or questions, please feel free to contact our customer support.\n\n\
         We appreciate your understanding and hope to serve you better in the future.\n\n\
         Regards,\n\
         Swiggy",
        username = customer.username,
        id = order.id,
        total = amount(order.total_amount),
    );
    let mut recipients = vec![customer.email.clone()];
    if let Some(agent) = agent
        && !agent.email.is_empty()
    {
        recipients.push(agent.email.clone());
    }
    TaskKind::SendMail {
        subject: format!("Order Cancellation - Order ID: {}", order.id),
        message,
        recipients,
    }
}

fn amount(value: Decimal) -> String {
    money(value).to_string()
}
