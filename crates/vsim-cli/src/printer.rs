//! Console rendering of bus notifications.

use colored::Colorize;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;
use vsim_types::{Channel, Notification};

/// Print every notification received on `rx` until its bus is dropped.
pub async fn run(mut rx: broadcast::Receiver<Notification>) {
    loop {
        match rx.recv().await {
            Ok(notification) => println!("{}", render(&notification)),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "console printer fell behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// One console line for `notification`, tagged with its channel.
pub fn render(notification: &Notification) -> String {
    let channel = notification.channel();
    let tag = format!("[{channel}]");
    let tag = match channel {
        Channel::RpcException
        | Channel::PublishException
        | Channel::SubscribeException
        | Channel::GenericError
        | Channel::PublishFailed
        | Channel::SubscribeFailed => tag.red().bold(),
        Channel::TopicUpdate => tag.magenta(),
        Channel::ServiceStarted | Channel::ServiceStopped => tag.cyan(),
        _ => tag.green(),
    };
    format!("  {tag} {}", describe(notification))
}

fn describe(notification: &Notification) -> String {
    match notification {
        Notification::RpcSent { message, data, .. } => format!("{message} {data}"),
        Notification::RpcResponse { exchange, counters } => format!(
            "#{} {} {} {} (total {}, success {})",
            exchange.sequence_number,
            exchange.method_name,
            if exchange.success { "succeeded" } else { "failed" },
            exchange.response,
            counters.total_rpc,
            counters.success_rpc
        ),
        Notification::RpcException { method_name, trace } => format!("{method_name}: {trace}"),
        Notification::PublishSuccess { message, data, .. }
        | Notification::PublishFailed { message, data, .. } => format!("{message} {data}"),
        Notification::SubscribeSuccess { message, .. }
        | Notification::SubscribeFailed { message, .. } => message.clone(),
        Notification::PublishException { topic, trace }
        | Notification::SubscribeException { topic, trace } => format!("{topic}: {trace}"),
        Notification::TopicUpdate { topic, json_data, .. } => format!("{topic} {json_data}"),
        Notification::GenericError { message } => message.clone(),
        Notification::ServiceStarted { entity } => format!("{entity} is running"),
        Notification::ServiceStopped { entity } => format!("{entity} stopped"),
    }
}
