pub mod subscription_gateway;
