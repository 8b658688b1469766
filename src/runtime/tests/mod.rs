//! Runtime 模块测试
