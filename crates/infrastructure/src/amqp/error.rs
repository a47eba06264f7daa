//! lapin 错误到代理端口错误的映射

use application::BrokerError;

pub(crate) fn connection(err: lapin::Error) -> BrokerError {
    BrokerError::connection(err.to_string())
}

pub(crate) fn channel(err: lapin::Error) -> BrokerError {
    match err {
        lapin::Error::InvalidChannelState(_) | lapin::Error::InvalidConnectionState(_) => {
            BrokerError::Closed
        }
        other => BrokerError::channel(other.to_string()),
    }
}

pub(crate) fn declare(exchange: &str, err: lapin::Error) -> BrokerError {
    BrokerError::Declare {
        exchange: exchange.to_string(),
        message: err.to_string(),
    }
}

pub(crate) fn queue(err: lapin::Error) -> BrokerError {
    BrokerError::Queue {
        message: err.to_string(),
    }
}

pub(crate) fn bind(exchange: &str, routing_key: &str, err: lapin::Error) -> BrokerError {
    BrokerError::Bind {
        exchange: exchange.to_string(),
        routing_key: routing_key.to_string(),
        message: err.to_string(),
    }
}

pub(crate) fn publish(exchange: &str, err: lapin::Error) -> BrokerError {
    BrokerError::Publish {
        exchange: exchange.to_string(),
        message: err.to_string(),
    }
}

pub(crate) fn consume(err: lapin::Error) -> BrokerError {
    BrokerError::Consume {
        message: err.to_string(),
    }
}

pub(crate) fn ack(err: lapin::Error) -> BrokerError {
    BrokerError::Ack {
        message: err.to_string(),
    }
}
