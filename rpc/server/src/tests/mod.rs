mod client_server;
